//! Pipeline orchestrator.
//!
//! Runs the four steps in dependency order:
//! 1. tracks and artists
//! 2. users
//! 3. time
//! 4. session plays (joins events against the tracks and artists)
//!
//! Any failure aborts the remaining steps. Tables written by earlier steps
//! are left as committed. Cancellation is honoured between steps only.

mod signal;
pub mod tables;

pub use signal::shutdown_signal;

use arrow::array::RecordBatch;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{
    CancelledSnafu, PipelineError, PipelineStorageSnafu, ReadSnafu, TransformSnafu, WriteSnafu,
};
use crate::metrics::events::StepCompleted;
use crate::schema::RecordKind;
use crate::sink::{PartitionedWriter, TableSink, WriteSummary, WriterConfig};
use crate::source::{RecordSource, StorageSource};
use crate::storage::StorageProvider;

use tables::{ARTISTS, SESSION_PLAYS, TIME, TRACKS, TrackTables, USERS, partition_columns};

/// The steps of a run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    TracksAndArtists,
    Users,
    Time,
    SessionPlays,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::TracksAndArtists,
        Step::Users,
        Step::Time,
        Step::SessionPlays,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::TracksAndArtists => "tracks_and_artists",
            Step::Users => "users",
            Step::Time => "time",
            Step::SessionPlays => "session_plays",
        }
    }
}

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub steps_completed: usize,
    pub tracks: u64,
    pub artists: u64,
    pub users: u64,
    pub time: u64,
    pub session_plays: u64,
    pub files_written: usize,
    pub bytes_written: u64,
}

impl PipelineStats {
    fn record(&mut self, summary: &WriteSummary) {
        let rows = match summary.destination.as_str() {
            TRACKS => &mut self.tracks,
            ARTISTS => &mut self.artists,
            USERS => &mut self.users,
            TIME => &mut self.time,
            _ => &mut self.session_plays,
        };
        *rows = summary.rows;
        self.files_written += summary.files;
        self.bytes_written += summary.bytes;
    }
}

/// Raw inputs, read at most once per run.
#[derive(Default)]
struct RawInputs {
    tracks: Option<RecordBatch>,
    plays: Option<RecordBatch>,
}

/// The pipeline orchestrator.
pub struct Pipeline {
    config: Config,
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn TableSink>,
    shutdown: CancellationToken,
    inputs: RawInputs,
    stats: PipelineStats,
}

impl Pipeline {
    /// Create a pipeline over an injected source and sink.
    pub fn new(
        config: Config,
        source: Arc<dyn RecordSource>,
        sink: Arc<dyn TableSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            shutdown,
            inputs: RawInputs::default(),
            stats: PipelineStats::default(),
        }
    }

    /// Create a pipeline reading from and writing to the configured locations.
    pub async fn from_config(
        config: Config,
        shutdown: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let source_storage = StorageProvider::for_existing_url_with_options(
            &config.source.path,
            config.source.storage_options.clone(),
        )
        .await
        .context(PipelineStorageSnafu)?;
        let sink_storage = StorageProvider::for_url_with_options(
            &config.sink.path,
            config.sink.storage_options.clone(),
        )
        .await
        .context(PipelineStorageSnafu)?;

        info!(
            "Reading from {}, writing to {}",
            source_storage.canonical_url(),
            sink_storage.canonical_url()
        );

        let source = StorageSource::new(
            Arc::new(source_storage),
            config.source.max_concurrent_files,
        );
        let sink = PartitionedWriter::new(
            Arc::new(sink_storage),
            WriterConfig::from(&config.sink),
        );

        Ok(Self::new(config, Arc::new(source), Arc::new(sink), shutdown))
    }

    /// Run every step in order.
    pub async fn run(&mut self) -> Result<PipelineStats, PipelineError> {
        info!("Starting pipeline");

        for step in Step::ALL {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested, skipping step {}", step.name());
                return CancelledSnafu { step: step.name() }.fail();
            }

            let start = Instant::now();
            info!("Running step {}", step.name());
            match step {
                Step::TracksAndArtists => self.tracks_and_artists(step).await?,
                Step::Users => self.users(step).await?,
                Step::Time => self.time(step).await?,
                Step::SessionPlays => self.session_plays(step).await?,
            }
            emit!(StepCompleted {
                step: step.name(),
                duration: start.elapsed(),
            });
            self.stats.steps_completed += 1;
        }

        info!("Pipeline completed: {:?}", self.stats);
        Ok(self.stats.clone())
    }

    async fn raw_tracks(&mut self, step: Step) -> Result<RecordBatch, PipelineError> {
        if let Some(batch) = &self.inputs.tracks {
            return Ok(batch.clone());
        }
        let batch = self
            .source
            .read(&self.config.source.tracks_pattern, RecordKind::Track)
            .await
            .context(ReadSnafu { step: step.name() })?;
        info!("Read {} track records", batch.num_rows());
        self.inputs.tracks = Some(batch.clone());
        Ok(batch)
    }

    /// NextSong events.
    async fn plays(&mut self, step: Step) -> Result<RecordBatch, PipelineError> {
        if let Some(batch) = &self.inputs.plays {
            return Ok(batch.clone());
        }
        let events = self
            .source
            .read(&self.config.source.events_pattern, RecordKind::Event)
            .await
            .context(ReadSnafu { step: step.name() })?;
        let plays = tables::next_song_events(&events)
            .context(TransformSnafu { step: step.name() })?;
        info!(
            "Read {} event records, {} playbacks",
            events.num_rows(),
            plays.num_rows()
        );
        self.inputs.plays = Some(plays.clone());
        Ok(plays)
    }

    async fn track_tables(&mut self, step: Step) -> Result<TrackTables, PipelineError> {
        let raw = self.raw_tracks(step).await?;
        tables::tracks_and_artists(&raw).context(TransformSnafu { step: step.name() })
    }

    async fn write(
        &mut self,
        step: Step,
        destination: &str,
        table: &RecordBatch,
    ) -> Result<(), PipelineError> {
        debug!("Writing {} rows to {}", table.num_rows(), destination);
        let summary = self
            .sink
            .write(table, destination, partition_columns(destination))
            .await
            .context(WriteSnafu { step: step.name() })?;
        if !summary.cleanup_complete {
            warn!(
                "{} committed but stale files remain; read it through its manifest",
                destination
            );
        }
        self.stats.record(&summary);
        Ok(())
    }

    async fn tracks_and_artists(&mut self, step: Step) -> Result<(), PipelineError> {
        let tables = self.track_tables(step).await?;
        self.write(step, TRACKS, &tables.tracks).await?;
        self.write(step, ARTISTS, &tables.artists).await
    }

    async fn users(&mut self, step: Step) -> Result<(), PipelineError> {
        let plays = self.plays(step).await?;
        let users = tables::users(&plays).context(TransformSnafu { step: step.name() })?;
        self.write(step, USERS, &users).await
    }

    async fn time(&mut self, step: Step) -> Result<(), PipelineError> {
        let plays = self.plays(step).await?;
        let time = tables::time_table(&plays, self.config.transform.timezone)
            .context(TransformSnafu { step: step.name() })?;
        self.write(step, TIME, &time).await
    }

    async fn session_plays(&mut self, step: Step) -> Result<(), PipelineError> {
        let track_tables = self.track_tables(step).await?;
        let plays = self.plays(step).await?;
        let session_plays =
            tables::session_plays(&plays, &track_tables, self.config.transform.timezone)
                .context(TransformSnafu { step: step.name() })?;
        self.write(step, SESSION_PLAYS, &session_plays).await
    }
}

/// Run the pipeline with the given configuration.
///
/// SIGINT, SIGTERM and SIGQUIT cancel the run before its next step.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let mut pipeline = Pipeline::from_config(config, shutdown).await?;
    pipeline.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReaderError, WriterError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed NDJSON text per record kind.
    struct FixedSource {
        tracks: &'static str,
        events: &'static str,
        reads: Mutex<usize>,
    }

    #[async_trait]
    impl RecordSource for FixedSource {
        async fn read(&self, pattern: &str, kind: RecordKind) -> Result<RecordBatch, ReaderError> {
            *self.reads.lock().unwrap() += 1;
            let text = match kind {
                RecordKind::Track => self.tracks,
                RecordKind::Event => self.events,
            };
            let reader = crate::source::NdjsonReader::new(kind);
            Ok(reader
                .read(bytes::Bytes::from_static(text.as_bytes()), pattern)?
                .batch)
        }
    }

    /// Remembers row counts per destination.
    #[derive(Default)]
    struct RecordingSink {
        written: Mutex<HashMap<String, (usize, Vec<String>)>>,
    }

    #[async_trait]
    impl TableSink for RecordingSink {
        async fn write(
            &self,
            table: &RecordBatch,
            destination: &str,
            partition_columns: &[&str],
        ) -> Result<WriteSummary, WriterError> {
            self.written.lock().unwrap().insert(
                destination.to_string(),
                (
                    table.num_rows(),
                    partition_columns.iter().map(|c| c.to_string()).collect(),
                ),
            );
            Ok(WriteSummary {
                destination: destination.to_string(),
                rows: table.num_rows() as u64,
                files: 1,
                bytes: 10,
                partitions: 1,
                cleanup_complete: true,
            })
        }
    }

    const TRACKS_NDJSON: &str = r#"{"song_id":"S1","title":"Song A","artist_id":"AR1","artist_name":"Artist X","duration":200.0,"year":2000}
{"song_id":"S1","title":"Song A again","artist_id":"AR1","artist_name":"Artist X","duration":200.0,"year":2000}
"#;

    const EVENTS_NDJSON: &str = r#"{"userId":"7","song":"Song A","artist":"Artist X","length":200.0,"page":"NextSong","ts":1000000000000,"level":"free"}
{"userId":"","song":"Unknown","artist":"Nobody","length":1.0,"page":"NextSong","ts":1000000000001,"level":"free"}
{"userId":"8","page":"Home","ts":1000000000002,"level":"paid"}
"#;

    fn pipeline(sink: Arc<RecordingSink>, shutdown: CancellationToken) -> (Pipeline, Arc<FixedSource>) {
        let source = Arc::new(FixedSource {
            tracks: TRACKS_NDJSON,
            events: EVENTS_NDJSON,
            reads: Mutex::new(0),
        });
        let pipeline = Pipeline::new(
            Config::new("memory://raw", "memory://out"),
            source.clone(),
            sink,
            shutdown,
        );
        (pipeline, source)
    }

    #[tokio::test]
    async fn test_run_writes_every_destination() {
        let sink = Arc::new(RecordingSink::default());
        let (mut pipeline, source) = pipeline(sink.clone(), CancellationToken::new());

        let stats = pipeline.run().await.unwrap();
        assert_eq!(stats.steps_completed, 4);
        assert_eq!(stats.tracks, 1);
        assert_eq!(stats.artists, 1);
        assert_eq!(stats.users, 1);
        assert_eq!(stats.time, 2);
        assert_eq!(stats.session_plays, 2);
        assert_eq!(stats.files_written, 5);

        // Raw inputs are read once and reused by later steps
        assert_eq!(*source.reads.lock().unwrap(), 2);

        let written = sink.written.lock().unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(
            written[TRACKS].1,
            vec!["release_year".to_string(), "artist_id".to_string()]
        );
        assert_eq!(
            written[SESSION_PLAYS].1,
            vec!["year".to_string(), "month".to_string()]
        );
        assert!(written[USERS].1.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let sink = Arc::new(RecordingSink::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (mut pipeline, _) = pipeline(sink.clone(), shutdown);

        let err = pipeline.run().await.unwrap_err();
        assert!(
            matches!(&err, PipelineError::Cancelled { step } if step == "tracks_and_artists"),
            "{err}"
        );
        assert!(sink.written.lock().unwrap().is_empty());
    }

    #[test]
    fn test_step_order() {
        let names: Vec<&str> = Step::ALL.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["tracks_and_artists", "users", "time", "session_plays"]);
    }
}
