use std::path::PathBuf;

/// A course: an ordered set of songs played back to back in the nonstop,
/// oni and endless modes. Entries are opaque here; the session state only
/// needs identity and presentation facts.
#[derive(Debug, Clone)]
pub struct CourseData {
    pub name: String,
    pub banner_path: Option<PathBuf>,
    /// Stable identifier used to key course score tables.
    pub course_key: String,
    pub num_entries: usize,
}

impl CourseData {
    pub fn new(name: &str, key: &str, num_entries: usize) -> Self {
        Self {
            name: name.to_string(),
            banner_path: None,
            course_key: key.to_string(),
            num_entries,
        }
    }
}
