mod progress;
mod summary;

pub use self::progress::Progress;
pub use self::summary::Summary;
