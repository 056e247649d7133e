//! Local file reader (ground: `filereader.py`, `utils.py::load_file`). Lets
//! an operator seed the store from a line-delimited proxy list on disk
//! instead of (or alongside) the network scrapers.
use std::path::PathBuf;

use super::BoxFuture;
use crate::scrapers::Scraper;

pub struct FileReader {
    path: PathBuf,
}

impl FileReader {
    pub fn new(path: PathBuf) -> Self {
        FileReader { path }
    }
}

impl Scraper for FileReader {
    fn name(&self) -> &'static str {
        "file-reader"
    }

    fn scrape<'a>(&'a self, _framework: &'a super::ScraperFramework) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            let proxylist = load_file(&self.path);
            log::info!(
                "file-reader: read {} proxies from file: {}",
                proxylist.len(),
                self.path.display()
            );
            proxylist
        })
    }
}

/// Reads non-blank, non-`#`-comment lines from `path` (ground:
/// `utils.py::load_file`).
fn load_file(path: &std::path::Path) -> Vec<String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("file-reader: failed to read {}: {e}", path.display());
            return Vec::new();
        }
    };

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1.2.3.4:8080\n# comment\n\n5.6.7.8:80\n").unwrap();

        let proxies = load_file(file.path());
        assert_eq!(proxies, vec!["1.2.3.4:8080".to_string(), "5.6.7.8:80".to_string()]);
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let proxies = load_file(std::path::Path::new("/nonexistent/path/to/proxies.txt"));
        assert!(proxies.is_empty());
    }
}
