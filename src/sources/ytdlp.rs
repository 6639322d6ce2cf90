use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{error::ProviderError, types::SourceDescriptor, utils};

use super::SourceProvider;

/// Searches a site through the download tool's own search extractors
/// (`ytsearch1:`, `scsearch1:`) and resolves the top hit to a concrete URL
/// without downloading anything.
pub struct YtDlpSearch {
    name: &'static str,
    program: String,
    search_prefix: &'static str,
    query_suffix: &'static str,
}

impl YtDlpSearch {
    pub fn youtube(program: &str) -> Self {
        YtDlpSearch {
            name: "youtube",
            program: program.to_string(),
            search_prefix: "ytsearch1",
            // keeps music videos and live clips from outranking the track itself
            query_suffix: " audio",
        }
    }

    pub fn soundcloud(program: &str) -> Self {
        YtDlpSearch {
            name: "soundcloud",
            program: program.to_string(),
            search_prefix: "scsearch1",
            query_suffix: "",
        }
    }

    pub fn search_term(&self, query: &str) -> String {
        format!("{}:{}{}", self.search_prefix, query, self.query_suffix)
    }
}

#[async_trait]
impl SourceProvider for YtDlpSearch {
    fn name(&self) -> &str {
        self.name
    }

    async fn find(&self, query: &str) -> Result<SourceDescriptor, ProviderError> {
        let search_term = self.search_term(query);
        let output = Command::new(&self.program)
            .args([
                "--flat-playlist",
                "--skip-download",
                "--print",
                "url",
                "--no-warnings",
                search_term.as_str(),
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProviderError::Process {
                provider: self.name.to_string(),
                detail: format!("cannot run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Process {
                provider: self.name.to_string(),
                detail: format!(
                    "search exited with {}: {}",
                    output.status,
                    utils::truncate_tail(stderr.trim(), 200)
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("http://") || line.starts_with("https://"))
            .map(|url| SourceDescriptor {
                provider: self.name.to_string(),
                url: url.to_string(),
            })
            .ok_or_else(|| ProviderError::Empty {
                provider: self.name.to_string(),
                query: search_term.clone(),
            })
    }
}
