//! Derivations of the five analytics tables from raw records.
//!
//! Pure functions over whole tables; all I/O stays in the orchestrator.

use arrow::array::RecordBatch;

use crate::error::TransformError;
use crate::transform::time::TIME_COLUMNS;
use crate::transform::{
    JoinSpec, JoinType, Predicate, Timezone, dedup, filter, join, project, with_time_columns,
};

pub const TRACKS: &str = "tracks";
pub const ARTISTS: &str = "artists";
pub const USERS: &str = "users";
pub const TIME: &str = "time";
pub const SESSION_PLAYS: &str = "session_plays";

/// Every output destination with its partition columns, in write order.
pub const DESTINATIONS: [(&str, &[&str]); 5] = [
    (TRACKS, &["release_year", "artist_id"]),
    (ARTISTS, &[]),
    (USERS, &[]),
    (TIME, &[]),
    (SESSION_PLAYS, &["year", "month"]),
];

/// Partition columns of a destination.
pub fn partition_columns(destination: &str) -> &'static [&'static str] {
    DESTINATIONS
        .iter()
        .find(|(name, _)| *name == destination)
        .map(|(_, columns)| *columns)
        .unwrap_or(&[])
}

const TRACK_COLUMNS: &[(&str, &str)] = &[
    ("song_id", "track_id"),
    ("title", "title"),
    ("year", "release_year"),
    ("duration", "duration_seconds"),
    ("artist_id", "artist_id"),
];

const ARTIST_COLUMNS: &[(&str, &str)] = &[
    ("artist_id", "artist_id"),
    ("artist_name", "name"),
    ("artist_location", "location"),
    ("artist_latitude", "latitude"),
    ("artist_longitude", "longitude"),
];

const USER_COLUMNS: &[(&str, &str)] = &[
    ("userId", "user_id"),
    ("firstName", "first_name"),
    ("lastName", "last_name"),
    ("gender", "gender"),
    ("level", "subscription_level"),
];

/// Each track row keeps its own artist name and location, so a track
/// credited differently from its artist's surviving row still matches.
const CATALOG_COLUMNS: &[(&str, &str)] = &[
    ("song_id", "track_id"),
    ("title", "title"),
    ("artist_name", "artist_name"),
    ("duration", "duration_seconds"),
    ("artist_id", "artist_id"),
    ("artist_location", "artist_location"),
];

/// Tables derived from the raw track records.
///
/// `catalog` is the lookup side of the session-play join and is never
/// written.
#[derive(Debug, Clone)]
pub struct TrackTables {
    pub tracks: RecordBatch,
    pub artists: RecordBatch,
    pub catalog: RecordBatch,
}

/// One row per `track_id` and one row per `artist_id`.
pub fn tracks_and_artists(raw_tracks: &RecordBatch) -> Result<TrackTables, TransformError> {
    let tracks = dedup(&project(raw_tracks, TRACK_COLUMNS)?, TRACKS, &["track_id"])?;
    let artists = dedup(&project(raw_tracks, ARTIST_COLUMNS)?, ARTISTS, &["artist_id"])?;
    let catalog = dedup(&project(raw_tracks, CATALOG_COLUMNS)?, "catalog", &["track_id"])?;
    Ok(TrackTables {
        tracks,
        artists,
        catalog,
    })
}

/// Events that represent an actual playback.
pub fn next_song_events(raw_events: &RecordBatch) -> Result<RecordBatch, TransformError> {
    filter(
        raw_events,
        "events",
        &[Predicate::Equals {
            column: "page",
            value: "NextSong",
        }],
    )
}

/// One row per known user among playback events.
pub fn users(plays: &RecordBatch) -> Result<RecordBatch, TransformError> {
    let identified = filter(plays, USERS, &[Predicate::Present { column: "userId" }])?;
    dedup(&project(&identified, USER_COLUMNS)?, USERS, &["user_id"])
}

/// One row per distinct playback timestamp with its calendar breakdown.
pub fn time_table(plays: &RecordBatch, timezone: Timezone) -> Result<RecordBatch, TransformError> {
    let timed = with_time_columns(plays, "ts", timezone)?;
    let columns: Vec<(&str, &str)> = std::iter::once(("ts", "start_time"))
        .chain(TIME_COLUMNS.iter().map(|c| (*c, *c)))
        .collect();
    dedup(&project(&timed, &columns)?, TIME, &["start_time"])
}

/// One row per playback event, matched to a track where title, artist
/// name and duration are all equal.
pub fn session_plays(
    plays: &RecordBatch,
    tables: &TrackTables,
    timezone: Timezone,
) -> Result<RecordBatch, TransformError> {
    let timed = with_time_columns(plays, "ts", timezone)?;

    let matched = join(
        &timed,
        &tables.catalog,
        &JoinSpec {
            on: &[
                ("song", "title"),
                ("artist", "artist_name"),
                ("length", "duration_seconds"),
            ],
            join_type: JoinType::LeftOuter,
            right_columns: &[
                ("track_id", "track_id"),
                ("artist_id", "artist_id"),
                ("artist_location", "artist_location"),
            ],
        },
    )?;

    project(
        &matched,
        &[
            ("level", "subscription_level"),
            ("artist_location", "location"),
            ("userAgent", "user_agent"),
            ("sessionId", "session_id"),
            ("track_id", "track_id"),
            ("artist_id", "artist_id"),
            ("userId", "user_id"),
            ("ts", "start_time"),
            ("year", "year"),
            ("month", "month"),
        ],
    )
}
