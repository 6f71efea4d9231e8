//! Static landing page

use std::path::Path;

use bytes::Bytes;

use crate::error::Result;

/// HTML page served at `/index.html`
///
/// Loaded once at startup and served from memory.
#[derive(Debug, Clone)]
pub struct IndexPage {
    content: Bytes,
}

impl IndexPage {
    /// Use the given HTML as the page
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Read the page from an HTML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), bytes = content.len(), "Index page loaded");
        Ok(Self::new(content))
    }

    /// Built-in page showing the stream at the given size
    pub fn builtin(width: u32, height: u32) -> Self {
        Self::new(format!(
            "<html>\n\
             <head>\n\
             <title>Camera Stream</title>\n\
             </head>\n\
             <body>\n\
             <h1>Camera Stream</h1>\n\
             <img src=\"stream.mjpg\" width=\"{width}\" height=\"{height}\" />\n\
             </body>\n\
             </html>\n"
        ))
    }

    /// Page bytes
    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

impl Default for IndexPage {
    fn default() -> Self {
        Self::builtin(640, 480)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_embeds_stream() {
        let page = IndexPage::builtin(1640, 1232);
        let html = std::str::from_utf8(page.content()).unwrap();

        assert!(html.contains("src=\"stream.mjpg\""));
        assert!(html.contains("width=\"1640\""));
        assert!(html.contains("height=\"1232\""));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("mjpeg-rs-page-{}.html", std::process::id()));
        std::fs::write(&path, "<p>hello</p>").unwrap();

        let page = IndexPage::load(&path).unwrap();
        assert_eq!(&page.content()[..], b"<p>hello</p>");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file() {
        let result = IndexPage::load("/nonexistent/index.html");
        assert!(result.is_err());
    }
}
