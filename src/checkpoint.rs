use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use geo::Coord;
use log::{debug, info};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{MatchError, Result};
use crate::segments::{ElementarySegment, SegmentRecord};
use crate::snapping::NodeMatch;

/// Half-open range `[start, end)` of trace point indices processed as one unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId {
    pub start: usize,
    pub end: usize,
}

impl BatchId {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    /// Consecutive batches of `size` points covering `[0, total)`; the last may be shorter
    pub fn batches(total: usize, size: usize) -> Vec<BatchId> {
        let size = size.max(1);
        (0..total)
            .step_by(size)
            .map(|start| BatchId::new(start, (start + size).min(total)))
            .collect()
    }

    /// The batch of `size` points that holds `index`
    pub fn containing(index: usize, size: usize, total: usize) -> BatchId {
        let size = size.max(1);
        let start = (index / size) * size;
        BatchId::new(start, (start + size).min(total.max(start + 1)))
    }
}

/// Per-batch persistence of intermediate results so an interrupted run can resume.
///
/// A batch is either stored completely or not at all.
pub trait CheckpointStore: Send + Sync {
    fn load_segments(&self, batch: &BatchId) -> Result<Option<Vec<ElementarySegment>>>;

    fn save_segments(&self, batch: &BatchId, segments: &[ElementarySegment]) -> Result<()>;

    fn load_node_matches(&self, batch: &BatchId) -> Result<Option<Vec<NodeMatch>>>;

    fn save_node_matches(&self, batch: &BatchId, matches: &[NodeMatch]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeMatchRow {
    index: usize,
    node: i64,
    latitude: f64,
    longitude: f64,
    #[serde(rename = "pointDistance")]
    point_distance: f64,
    #[serde(rename = "boundaryDistance")]
    boundary_distance: f64,
}

impl From<&NodeMatch> for NodeMatchRow {
    fn from(m: &NodeMatch) -> Self {
        Self {
            index: m.point_index,
            node: m.node_id,
            latitude: m.node_coord.y,
            longitude: m.node_coord.x,
            point_distance: m.point_distance,
            boundary_distance: m.boundary_distance,
        }
    }
}

impl From<NodeMatchRow> for NodeMatch {
    fn from(row: NodeMatchRow) -> Self {
        Self {
            point_index: row.index,
            node_id: row.node,
            node_coord: Coord {
                x: row.longitude,
                y: row.latitude,
            },
            point_distance: row.point_distance,
            boundary_distance: row.boundary_distance,
        }
    }
}

/// CSV files in one directory: `segments_{start}_{end}.csv` and `nodes_{start}_{end}.csv`
pub struct CsvCheckpointStore {
    dir: PathBuf,
}

impl CsvCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("Checkpoints in {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn segments_path(&self, batch: &BatchId) -> PathBuf {
        self.dir
            .join(format!("segments_{}_{}.csv", batch.start, batch.end))
    }

    pub fn nodes_path(&self, batch: &BatchId) -> PathBuf {
        self.dir.join(format!("nodes_{}_{}.csv", batch.start, batch.end))
    }

    fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
        if !path.exists() {
            return Ok(None);
        }
        let mut reader = csv::Reader::from_path(path)?;
        let rows = reader
            .deserialize()
            .collect::<std::result::Result<Vec<T>, _>>()
            .map_err(|e| MatchError::corrupt(path, e))?;
        Ok(Some(rows))
    }

    fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(BufWriter::new(File::create(&tmp)?));
            writer.write_record(headers)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, path)?;
        debug!("Wrote {} rows to {:?}", rows.len(), path);
        Ok(())
    }
}

const SEGMENT_HEADERS: [&str; 9] = [
    "x0",
    "y0",
    "x1",
    "y1",
    "cartesianLength",
    "osmLengthShare",
    "highway",
    "surface",
    "tracktype",
];

const NODE_HEADERS: [&str; 6] = [
    "index",
    "node",
    "latitude",
    "longitude",
    "pointDistance",
    "boundaryDistance",
];

impl CheckpointStore for CsvCheckpointStore {
    fn load_segments(&self, batch: &BatchId) -> Result<Option<Vec<ElementarySegment>>> {
        let path = self.segments_path(batch);
        let rows: Option<Vec<SegmentRecord>> = Self::read_rows(&path)?;
        Ok(rows.map(|rows| rows.into_iter().map(ElementarySegment::from).collect()))
    }

    fn save_segments(&self, batch: &BatchId, segments: &[ElementarySegment]) -> Result<()> {
        let rows: Vec<SegmentRecord> = segments.iter().map(SegmentRecord::from).collect();
        Self::write_rows(&self.segments_path(batch), &SEGMENT_HEADERS, &rows)
    }

    fn load_node_matches(&self, batch: &BatchId) -> Result<Option<Vec<NodeMatch>>> {
        let path = self.nodes_path(batch);
        let Some(rows) = Self::read_rows::<NodeMatchRow>(&path)? else {
            return Ok(None);
        };

        if rows.len() != batch.len() {
            return Err(MatchError::corrupt(
                &path,
                format!("{} rows for a batch of {} points", rows.len(), batch.len()),
            ));
        }
        for (expected, row) in (batch.start..batch.end).zip(&rows) {
            if row.index != expected {
                return Err(MatchError::corrupt(
                    &path,
                    format!("row for point {} where {} was expected", row.index, expected),
                ));
            }
        }
        Ok(Some(rows.into_iter().map(NodeMatch::from).collect()))
    }

    fn save_node_matches(&self, batch: &BatchId, matches: &[NodeMatch]) -> Result<()> {
        let rows: Vec<NodeMatchRow> = matches.iter().map(NodeMatchRow::from).collect();
        Self::write_rows(&self.nodes_path(batch), &NODE_HEADERS, &rows)
    }
}
