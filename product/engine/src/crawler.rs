use crate::bing::{parse_search_page, search_page_url, ImageHit};
use crate::config::CrawlerConfig;
use crate::scan::has_image_extension;
use crate::source::{FetchReport, FetchRequest, ImageSource, LogLine};
use crate::{EngineError, Result};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use url::Url;
use walkdir::WalkDir;

const MAX_DOWNLOADER_THREADS: usize = 32;
// Search pages requested beyond what `max_num` strictly needs.
const EXTRA_SEARCH_PAGES: usize = 2;

/// Searches Bing Images and saves results into the requested directory.
///
/// Result pages are fetched sequentially; images are downloaded by a small
/// pool of scoped worker threads. Files are named `000001.jpg`, `000002.png`,
/// ... continuing after whatever is already in the directory, and byte-identical
/// images are saved only once per directory.
#[derive(Debug, Clone)]
pub struct BingCrawler {
    agent: ureq::Agent,
    config: CrawlerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveStatus {
    Saved,
    Duplicate,
}

struct DownloadedImage {
    data: Vec<u8>,
    ext: &'static str,
    digest: String,
}

#[derive(Default)]
struct DownloadTally {
    saved: AtomicUsize,
    duplicates: AtomicUsize,
    failed: AtomicUsize,
}

impl BingCrawler {
    pub fn new(config: CrawlerConfig) -> Self {
        let mut builder = ureq::Agent::config_builder();
        builder = builder
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .user_agent(config.user_agent.as_str());
        let agent: ureq::Agent = builder.build().into();
        Self { agent, config }
    }

    fn collect_hits(
        &self,
        request: &FetchRequest<'_>,
        log_line: &mut LogLine<'_>,
    ) -> Result<(Vec<ImageHit>, usize)> {
        let page_size = self.config.page_size.max(1);
        let max_pages = request.max_num.div_ceil(page_size) + EXTRA_SEARCH_PAGES;

        let mut seen: HashSet<String> = HashSet::new();
        let mut hits: Vec<ImageHit> = Vec::new();
        let mut pages_fetched = 0_usize;
        let mut first = request.offset;

        for page_index in 0..max_pages {
            if hits.len() >= request.max_num {
                break;
            }
            if page_index > 0 && self.config.delay_ms > 0 {
                thread::sleep(Duration::from_millis(self.config.delay_ms));
            }

            let url = search_page_url(
                &self.config.search_endpoint,
                request.keyword,
                first,
                page_size,
            )?;
            let html = match fetch_text(&self.agent, &url) {
                Ok(html) => html,
                Err(err) => {
                    if pages_fetched == 0 {
                        return Err(EngineError::Http(format!(
                            "search page request failed for {}: {err}",
                            redact_url_for_log(&url)
                        )));
                    }
                    log_line(
                        "warn",
                        "bing_page_fetch_failed",
                        serde_json::json!({
                            "first": first,
                            "error": err,
                        }),
                    )?;
                    break;
                }
            };
            pages_fetched += 1;

            let mut fresh = 0_usize;
            for hit in parse_search_page(&html) {
                if seen.insert(hit.url.clone()) {
                    hits.push(hit);
                    fresh += 1;
                }
            }
            log_line(
                "info",
                "bing_page_fetched",
                serde_json::json!({
                    "first": first,
                    "new_hits": fresh,
                    "total_hits": hits.len(),
                }),
            )?;
            if fresh == 0 {
                break;
            }
            first += page_size;
        }

        Ok((hits, pages_fetched))
    }

    fn download_hits(&self, hits: Vec<ImageHit>, max_num: usize, store: &DiskStore) -> DownloadTally {
        let tally = DownloadTally::default();
        if hits.is_empty() || max_num == 0 {
            return tally;
        }

        let workers = self
            .config
            .downloader_threads
            .clamp(1, MAX_DOWNLOADER_THREADS)
            .min(hits.len());
        let queue: Mutex<VecDeque<ImageHit>> = Mutex::new(hits.into_iter().collect());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    if tally.saved.load(Ordering::SeqCst) >= max_num {
                        break;
                    }
                    let Some(hit) = lock(&queue).pop_front() else {
                        break;
                    };

                    let Some(image) = self.download_hit(&hit) else {
                        tally.failed.fetch_add(1, Ordering::SeqCst);
                        continue;
                    };

                    // Reserve a slot so concurrent workers never save more than max_num.
                    let reserved = tally
                        .saved
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                            (n < max_num).then_some(n + 1)
                        })
                        .is_ok();
                    if !reserved {
                        break;
                    }

                    match store.save(&image) {
                        Ok(SaveStatus::Saved) => {}
                        Ok(SaveStatus::Duplicate) => {
                            tally.saved.fetch_sub(1, Ordering::SeqCst);
                            tally.duplicates.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(_) => {
                            tally.saved.fetch_sub(1, Ordering::SeqCst);
                            tally.failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        tally
    }

    fn download_hit(&self, hit: &ImageHit) -> Option<DownloadedImage> {
        std::iter::once(hit.url.as_str())
            .chain(hit.thumb_url.as_deref())
            .find_map(|url| download_image(&self.agent, &self.config, url))
    }
}

impl ImageSource for BingCrawler {
    fn fetch(&self, request: &FetchRequest<'_>, log_line: &mut LogLine<'_>) -> Result<FetchReport> {
        std::fs::create_dir_all(request.dir)?;
        let (hits, pages_fetched) = self.collect_hits(request, log_line)?;
        let candidates = hits.len();

        let store = DiskStore::open(request.dir)?;
        let tally = self.download_hits(hits, request.max_num, &store);

        let report = FetchReport {
            pages_fetched,
            candidates,
            downloaded: tally.saved.load(Ordering::SeqCst),
            duplicates: tally.duplicates.load(Ordering::SeqCst),
            failed: tally.failed.load(Ordering::SeqCst),
        };
        log_line(
            "info",
            "bing_fetch_done",
            serde_json::json!({
                "offset": request.offset,
                "max_num": request.max_num,
                "report": report,
            }),
        )?;
        Ok(report)
    }
}

/// Tracks what is already in a download directory: content digests for
/// dedup and the next free sequential file number.
struct DiskStore {
    dir: PathBuf,
    seen: Mutex<HashSet<String>>,
    next_index: AtomicUsize,
}

impl DiskStore {
    fn open(dir: &Path) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut max_index = 0_usize;
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || !has_image_extension(entry.path()) {
                continue;
            }
            if let Some(index) = numeric_stem(entry.path()) {
                max_index = max_index.max(index);
            }
            if let Ok(data) = std::fs::read(entry.path()) {
                seen.insert(sha256_hex(&data));
            }
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            seen: Mutex::new(seen),
            next_index: AtomicUsize::new(max_index + 1),
        })
    }

    fn save(&self, image: &DownloadedImage) -> std::io::Result<SaveStatus> {
        if !lock(&self.seen).insert(image.digest.clone()) {
            return Ok(SaveStatus::Duplicate);
        }

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let final_path = self.dir.join(format!("{index:06}.{}", image.ext));
        let part_path = self.dir.join(format!("{index:06}.{}.part", image.ext));
        let written = std::fs::write(&part_path, &image.data)
            .and_then(|_| std::fs::rename(&part_path, &final_path));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&part_path);
            lock(&self.seen).remove(&image.digest);
            return Err(err);
        }
        Ok(SaveStatus::Saved)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn fetch_text(agent: &ureq::Agent, url: &str) -> std::result::Result<String, String> {
    let mut response = agent
        .get(url)
        .header("Accept-Language", "en-US,en;q=0.9")
        .call()
        .map_err(|e| e.to_string())?;
    let status = response.status().as_u16();
    if status >= 400 {
        return Err(format!("http status {status}"));
    }
    let mut buf = Vec::new();
    response
        .body_mut()
        .as_reader()
        .read_to_end(&mut buf)
        .map_err(|e| e.to_string())?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn download_image(agent: &ureq::Agent, config: &CrawlerConfig, url: &str) -> Option<DownloadedImage> {
    let mut response = agent.get(url).call().ok()?;
    if response.status().as_u16() >= 400 {
        return None;
    }

    let content_type = header_string(&response, "content-type");
    if content_type.contains("text/html") {
        return None;
    }
    let declared_len = header_string(&response, "content-length").parse::<u64>().ok();
    if declared_len.is_some_and(|len| len > config.max_image_bytes) {
        return None;
    }

    let mut data = Vec::new();
    response
        .body_mut()
        .as_reader()
        .take(config.max_image_bytes.saturating_add(1))
        .read_to_end(&mut data)
        .ok()?;

    let len = data.len() as u64;
    if len < config.min_image_bytes.max(1) || len > config.max_image_bytes {
        return None;
    }

    let ext = sniff_image_extension(&data)?;
    let digest = sha256_hex(&data);
    Some(DownloadedImage { data, ext, digest })
}

/// Identifies a raster image by its magic bytes and returns the extension to
/// save it under. Anything else (HTML error pages, truncated bodies) is `None`.
pub fn sniff_image_extension(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("gif")
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("webp")
    } else if data.len() >= 26 && data.starts_with(b"BM") {
        Some("bmp")
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        Some("tiff")
    } else {
        None
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn numeric_stem(path: &Path) -> Option<usize> {
    path.file_stem()?.to_str()?.parse::<usize>().ok()
}

fn header_string(response: &ureq::http::Response<ureq::Body>, key: &str) -> String {
    response
        .headers()
        .get(key)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

pub fn redact_url_for_log(value: &str) -> String {
    match Url::parse(value) {
        Ok(uri) => {
            let scheme = uri.scheme();
            let authority = uri.host_str().unwrap_or("unknown-host");
            format!("{scheme}://{authority}/...")
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
