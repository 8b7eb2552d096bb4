use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ImageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOpts {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
    pub org_id: i64,
}

impl RenderOpts {
    pub fn panel(path: String, org_id: i64, timeout: Duration) -> Self {
        Self {
            path,
            width: 1000,
            height: 500,
            timeout,
            org_id,
        }
    }
}

/// Screenshots a panel to a local file.
#[async_trait::async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(&self, opts: RenderOpts) -> Result<PathBuf, ImageError>;
}

/// Publishes a rendered file and returns its public URL.
#[async_trait::async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, ImageError>;
}
