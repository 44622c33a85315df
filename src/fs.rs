use async_trait::async_trait;
use std::io;
use std::time::SystemTime;

/// File-system collaborator. The engine depends on exactly these two
/// operations; stat and read failures propagate verbatim to the render
/// caller. Tests substitute their own implementation.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn stat(&self, path: &str) -> io::Result<SystemTime>;
    async fn read(&self, path: &str) -> io::Result<String>;
}

/// Real file system backed by `tokio::fs`.
pub struct DiskFs;

#[async_trait]
impl FileSystem for DiskFs {
    async fn stat(&self, path: &str) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn read(&self, path: &str) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}
