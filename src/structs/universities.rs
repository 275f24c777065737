use std::collections::HashSet;

use tracing::info;

use super::client::Client;
use crate::errors::DrPilotError;

/// Published list of Brazilian universities, one per line.
pub const UNIVERSITIES_URL: &str = "https://gist.githubusercontent.com/alexandremcosta/c9361cc23722a5aa1133/raw/1a49c7cfff76dedea615dee4ea4bc47c2e7be621/universidades.csv";

pub const MAX_SUGGESTIONS: usize = 12;

/// University names offered while the registration or profile form is being filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniversityDirectory {
    names: Vec<String>,
}

impl UniversityDirectory {
    /// Parses one name per line. Blank lines and repeats are dropped.
    pub fn parse(text: &str) -> Self {
        let mut seen = HashSet::new();
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| seen.insert(line.to_string()))
            .map(str::to_string)
            .collect();

        Self { names }
    }

    /// Downloads and parses the list at `url`.
    pub async fn fetch(client: &Client, url: &str) -> Result<Self, DrPilotError> {
        let text = client.fetch_text(url).await?;
        let directory = Self::parse(&text);

        info!(count = directory.len(), "university list loaded");
        Ok(directory)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Case-insensitive substring matches for `query`, at most `MAX_SUGGESTIONS`.
    pub fn suggest(&self, query: &str) -> Vec<&str> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        self.names
            .iter()
            .filter(|name| name.to_lowercase().contains(&query))
            .take(MAX_SUGGESTIONS)
            .map(String::as_str)
            .collect()
    }
}
