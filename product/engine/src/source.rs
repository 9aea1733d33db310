use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Structured log sink: `(level, event, data)`.
pub type LogLine<'a> = dyn FnMut(&str, &str, serde_json::Value) -> Result<()> + 'a;

/// One round's request to an image provider.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub keyword: &'a str,
    /// Rank of the first result to consider. Opaque pagination cursor.
    pub offset: usize,
    pub max_num: usize,
    pub dir: &'a Path,
}

/// What a provider says it did. Informational only; progress is measured on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchReport {
    pub pages_fetched: usize,
    pub candidates: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Something that can search for images and save them into a directory.
///
/// Implementations are best effort: saving fewer than `max_num` images is a
/// normal outcome, not an error. An `Err` is reserved for faults that stopped
/// the attempt as a whole.
pub trait ImageSource {
    fn fetch(&self, request: &FetchRequest<'_>, log_line: &mut LogLine<'_>) -> Result<FetchReport>;
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn fetch(&self, request: &FetchRequest<'_>, log_line: &mut LogLine<'_>) -> Result<FetchReport> {
        (**self).fetch(request, log_line)
    }
}

impl<S: ImageSource + ?Sized> ImageSource for std::sync::Arc<S> {
    fn fetch(&self, request: &FetchRequest<'_>, log_line: &mut LogLine<'_>) -> Result<FetchReport> {
        (**self).fetch(request, log_line)
    }
}
