use std::borrow::Cow;
use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::{Captures, Regex};

use crate::models::{Post, Release, ReleaseType};

/// Artist/title separators. Only spaced forms count, so hyphenated names
/// ("Jay-Z", "Run-DMC") are never cut.
const SEPARATORS: [&str; 2] = [" - ", " – "];

const POST_DATE_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

static ENTITY_RE: OnceLock<Regex> = OnceLock::new();

/// Turn raw posts into releases of the given type. Posts that cannot be split
/// into artist and title, or that carry no usable date, are dropped.
pub fn normalize_posts(posts: &[Post], kind: ReleaseType) -> Vec<Release> {
    let mut releases = Vec::with_capacity(posts.len());

    for post in posts {
        let query = decode_entities(&post.query);
        let Some((artist, title)) = split_query(&query) else {
            tracing::warn!("Skipping post {} without artist/title separator: {:?}", post.id, post.query);
            continue;
        };
        let Some(date) = post.raw_date.as_deref().and_then(parse_post_date) else {
            tracing::warn!("Skipping post {} with unusable date {:?}", post.id, post.raw_date);
            continue;
        };
        releases.push(Release::new(post.id, artist, title, kind, date));
    }

    releases
}

/// Split "Artist - Title" on the first recognized separator and trim both sides.
pub fn split_query(query: &str) -> Option<(&str, &str)> {
    let (idx, sep) = SEPARATORS
        .iter()
        .find_map(|sep| query.find(sep).map(|idx| (idx, *sep)))?;

    let artist = query[..idx].trim();
    let title = query[idx + sep.len()..].trim();
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((artist, title))
}

pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, POST_DATE_LAYOUT)
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Decode the HTML entities the listing API leaves in titles.
pub fn decode_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let re = ENTITY_RE.get_or_init(|| {
        Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity regex")
    });

    re.replace_all(s, |caps: &Captures| {
        let entity = &caps[1];
        let decoded = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = entity.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(entity)
        };
        decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
    })
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        "lt" => '<',
        "gt" => '>',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "hellip" => '…',
        _ => return None,
    };
    Some(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn splits_ascii_hyphen() {
        assert_eq!(
            split_query("21 Savage - American Dream"),
            Some(("21 Savage", "American Dream"))
        );
    }

    #[test]
    fn splits_en_dash() {
        assert_eq!(
            split_query("Dave East – Fortune Favors the Bold"),
            Some(("Dave East", "Fortune Favors the Bold"))
        );
    }

    #[test]
    fn spaced_separator_beats_hyphen_inside_name() {
        assert_eq!(split_query("Jay-Z - The Blueprint"), Some(("Jay-Z", "The Blueprint")));
        assert_eq!(split_query("Jay-Z – The Blueprint"), Some(("Jay-Z", "The Blueprint")));
    }

    #[test]
    fn unspaced_hyphen_is_not_a_separator() {
        assert_eq!(split_query("Nas-Illmatic"), None);
        assert_eq!(split_query("Jay-Z"), None);
        assert_eq!(split_query("Run-DMC Reunion Tour Announced"), None);
        assert_eq!(split_query("Nas–Illmatic"), None);
    }

    #[test]
    fn sides_are_trimmed() {
        assert_eq!(split_query("  Nas  -  Illmatic  "), Some(("Nas", "Illmatic")));
    }

    #[test]
    fn no_separator_or_empty_side_is_rejected() {
        assert_eq!(split_query("Just A Title"), None);
        assert_eq!(split_query(" - Title"), None);
        assert_eq!(split_query("Artist - "), None);
    }

    #[test]
    fn normalizes_the_savage_post() {
        let posts = vec![Post::new(1, "21 Savage - American Dream", "2024-01-12 00:00:00")];

        let releases = normalize_posts(&posts, ReleaseType::Album);

        assert_eq!(releases.len(), 1);
        let r = &releases[0];
        assert_eq!(r.id, 1);
        assert_eq!(r.artist.name, "21 Savage");
        assert_eq!(r.title, "American Dream");
        assert_eq!(r.kind, ReleaseType::Album);
        assert_eq!(r.date, date(2024, 1, 12));
        assert_eq!(r.cover_url, None);
    }

    #[test]
    fn drops_unsplittable_and_undated_posts_but_keeps_the_rest() {
        let mut undated = Post::new(3, "Future - Pluto", "");
        undated.raw_date = None;
        let posts = vec![
            Post::new(1, "Release Calendar", "2024-01-12 00:00:00"),
            Post::new(4, "Run-DMC Reunion Tour Announced", "2024-01-12 00:00:00"),
            Post::new(2, "Drake – For All The Dogs", "2024-02-01 10:30:00"),
            undated,
        ];

        let releases = normalize_posts(&posts, ReleaseType::Single);

        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].artist.name, "Drake");
        assert_eq!(releases[0].kind, ReleaseType::Single);
    }

    #[test]
    fn decodes_encoded_en_dash_before_splitting() {
        let posts = vec![Post::new(7, "Dave East &#8211; Fortune &amp; Fame", "2024-01-01 00:00:00")];

        let releases = normalize_posts(&posts, ReleaseType::Album);

        assert_eq!(releases[0].artist.name, "Dave East");
        assert_eq!(releases[0].title, "Fortune & Fame");
    }

    #[test]
    fn leaves_unknown_entities_alone() {
        assert_eq!(decode_entities("A &bogus; B"), "A &bogus; B");
        assert_eq!(decode_entities("Don&#x27;t"), "Don't");
    }

    #[test]
    fn parses_listing_dates() {
        assert_eq!(parse_post_date("2024-01-12 13:45:00"), Some(date(2024, 1, 12)));
        assert_eq!(parse_post_date("2024-01-12"), Some(date(2024, 1, 12)));
        assert_eq!(parse_post_date("12/01/2024"), None);
    }
}
