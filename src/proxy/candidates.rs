//! Reading candidate lists and persisting the accepted set

use crate::proxy::validator;
use crate::Result;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Source path meaning "read from standard input"
pub const STDIN_SOURCE: &str = "-";

/// Candidate list input and accepted-set output
pub struct CandidateList;

impl CandidateList {
    /// Split text into candidates, one per line
    ///
    /// Lines are kept verbatim, blank ones included, so that every line shows
    /// up in the report. A trailing newline does not add an empty candidate.
    pub fn parse_string(content: &str) -> Vec<String> {
        content.lines().map(str::to_string).collect()
    }

    /// Read candidates from a file, or from stdin when the path is `-`
    pub fn read<P: AsRef<Path>>(source: P) -> Result<Vec<String>> {
        let source = source.as_ref();
        let content = if source.as_os_str() == STDIN_SOURCE {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            fs::read_to_string(source)?
        };
        Ok(Self::parse_string(&content))
    }

    /// Split candidates by the address validator
    pub fn partition_valid(candidates: &[String]) -> (Vec<&str>, Vec<&str>) {
        candidates
            .iter()
            .map(String::as_str)
            .partition(|candidate| validator::validate(candidate))
    }

    /// Render addresses as `<address>\n` lines
    pub fn render(addresses: &[String]) -> String {
        addresses
            .iter()
            .map(|address| format!("{}\n", address))
            .collect()
    }

    /// Save addresses to a file, one per line, replacing its contents
    pub fn save_to_file<P: AsRef<Path>>(addresses: &[String], path: P) -> Result<()> {
        fs::write(path, Self::render(addresses))?;
        Ok(())
    }
}
