mod post;
mod release;
mod user;

pub use post::{Post, TodayPost};
pub use release::{Artist, Cover, Release, ReleaseType};
pub use user::{PageCursor, PageView, User};
