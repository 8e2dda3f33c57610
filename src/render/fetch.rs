//! Sample fetch fan-out.
//!
//! Every distinct file referenced by an audible audio region is requested
//! once, concurrently, before rendering starts. A failed fetch only loses
//! its regions; the render goes on without them.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::config::RenderConfig;
use crate::dsp::sampler::SampleBuffer;
use crate::error::{FetchError, RenderError};
use crate::project::{Project, Region};

use super::{CancelToken, RenderOutput, render};

/// Source of decoded sample data. Called from blocking worker threads.
pub trait SampleFetcher: Send + Sync {
    fn fetch(&self, file_id: &str) -> Result<SampleBuffer, FetchError>;
}

/// Fetcher over samples already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    samples: HashMap<String, SampleBuffer>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: impl Into<String>, sample: SampleBuffer) {
        self.samples.insert(file_id.into(), sample);
    }

    pub fn with_sample(mut self, file_id: impl Into<String>, sample: SampleBuffer) -> Self {
        self.insert(file_id, sample);
        self
    }
}

impl SampleFetcher for MemoryFetcher {
    fn fetch(&self, file_id: &str) -> Result<SampleBuffer, FetchError> {
        self.samples
            .get(file_id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                file_id: file_id.to_string(),
            })
    }
}

/// Fetcher that decodes `<root>/<file_id>` as a WAV file.
#[derive(Debug, Clone)]
pub struct WavFileFetcher {
    root: PathBuf,
}

impl WavFileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        WavFileFetcher { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SampleFetcher for WavFileFetcher {
    fn fetch(&self, file_id: &str) -> Result<SampleBuffer, FetchError> {
        let path = self.root.join(file_id);
        let decode_error = |reason: String| FetchError::Decode {
            file_id: file_id.to_string(),
            reason,
        };
        let reader = match hound::WavReader::open(&path) {
            Ok(reader) => reader,
            Err(hound::Error::IoError(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FetchError::NotFound {
                    file_id: file_id.to_string(),
                });
            }
            Err(hound::Error::IoError(e)) => return Err(FetchError::Io(e)),
            Err(e) => return Err(decode_error(e.to_string())),
        };

        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| decode_error(e.to_string()))?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| decode_error(e.to_string()))?
            }
        };

        let channel_count = usize::from(spec.channels.max(1));
        let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
        for frame in interleaved.chunks_exact(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        debug!(file_id, frames = channels[0].len(), sample_rate = spec.sample_rate, "sample decoded");
        Ok(SampleBuffer::new(channels, spec.sample_rate))
    }
}

/// Decoded samples for one render, keyed by file id.
#[derive(Debug, Clone, Default)]
pub struct SampleLibrary {
    samples: HashMap<String, Arc<SampleBuffer>>,
}

impl SampleLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_id: impl Into<String>, sample: SampleBuffer) {
        self.samples.insert(file_id.into(), Arc::new(sample));
    }

    pub fn get(&self, file_id: &str) -> Option<Arc<SampleBuffer>> {
        self.samples.get(file_id).cloned()
    }

    pub fn contains(&self, file_id: &str) -> bool {
        self.samples.contains_key(file_id)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Distinct file ids referenced by audible audio regions, in sorted order.
pub fn referenced_samples(project: &Project) -> BTreeSet<String> {
    project
        .audible_tracks()
        .flat_map(|t| t.regions.iter())
        .filter_map(|r| match r {
            Region::Audio(a) => Some(a.file_id.clone()),
            Region::Midi(_) => None,
        })
        .collect()
}

/// Fetch every referenced sample, one blocking task per distinct file.
#[instrument(skip_all)]
pub async fn prefetch_samples<F>(project: &Project, fetcher: Arc<F>) -> SampleLibrary
where
    F: SampleFetcher + ?Sized + 'static,
{
    let mut tasks = JoinSet::new();
    for file_id in referenced_samples(project) {
        let fetcher = Arc::clone(&fetcher);
        tasks.spawn_blocking(move || {
            let result = fetcher.fetch(&file_id);
            (file_id, result)
        });
    }

    let mut library = SampleLibrary::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((file_id, Ok(sample))) => library.insert(file_id, sample),
            Ok((file_id, Err(e))) => {
                warn!(%file_id, error = %e, "sample fetch failed; its regions will be skipped");
            }
            Err(e) => warn!(error = %e, "sample fetch task failed"),
        }
    }
    debug!(samples = library.len(), "prefetch complete");
    library
}

/// Fetch samples, then render on a blocking worker.
pub async fn render_project<F>(
    project: Project,
    config: RenderConfig,
    fetcher: Arc<F>,
    cancel: CancelToken,
) -> Result<RenderOutput, RenderError>
where
    F: SampleFetcher + ?Sized + 'static,
{
    config.validate()?;
    let library = prefetch_samples(&project, fetcher).await;
    cancel.check()?;
    tokio::task::spawn_blocking(move || render(&project, &library, config, cancel))
        .await
        .map_err(|e| RenderError::Join(e.to_string()))?
}
