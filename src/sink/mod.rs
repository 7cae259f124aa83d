//! Record sink: per-event columnar store
//!
//! The sink buffers decay/escape/beam/nuclei records while an event is open,
//! flushes them into append-only in-memory tables tagged with the event id at
//! the event boundary, and persists one Parquet file per logical table at the
//! end of the run. The deposited-energy grid is run-scoped and bypasses the
//! per-event buffers.
//!
//! Write pattern is strictly append-only: rows are only ever added at event
//! flush, and worker partitions are concatenated (never interleaved) by the
//! terminal merge.

pub mod edep;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int32Array, RecordBatch, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::provenance::track::Vec3;
use crate::{Error, Result};

pub use edep::{DoseProfile, EdepHistogram};

/// One positron-emitter observation: the parent nuclide at the moment the
/// positron was created, with creation position and within-event time.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayRecord {
    /// Mass number of the emitter nuclide
    pub a: i32,
    /// Atomic number of the emitter nuclide
    pub z: i32,
    /// Positron creation position (mm)
    pub position: Vec3,
    /// Within-event creation time (s)
    pub time_s: f64,
}

/// A particle leaving the body region into the world.
#[derive(Debug, Clone, PartialEq)]
pub struct EscapeRecord {
    /// PDG encoding of the escaping particle
    pub pdg: i32,
    /// Exit position (mm)
    pub position: Vec3,
    /// Polar angle of the exit momentum (rad)
    pub theta: f64,
    /// Azimuthal angle of the exit momentum (rad)
    pub phi: f64,
    /// Total energy at exit (MeV)
    pub energy_mev: f64,
    /// Global time at exit (s)
    pub time_s: f64,
    /// Creation position of the escaping track (mm)
    pub initial_position: Vec3,
}

/// Per-event primary-beam properties recorded at generation time.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamRecord {
    /// Primary vertex position (mm)
    pub position: Vec3,
    /// Primary momentum direction (unit vector)
    pub direction: Vec3,
    /// Kinetic energy per nucleon (MeV/u)
    pub energy_per_nucleon_mev: f64,
}

/// A heavy nuclear product observed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NucleiRecord {
    /// Mass number
    pub a: i32,
    /// Atomic number
    pub z: i32,
    /// Creation position (mm)
    pub position: Vec3,
}

#[derive(Debug, Default)]
struct EventBuffer {
    decays: Vec<DecayRecord>,
    escapes: Vec<EscapeRecord>,
    beams: Vec<BeamRecord>,
    nuclei: Vec<NucleiRecord>,
    primary_end: Option<Vec3>,
}

impl EventBuffer {
    fn clear(&mut self) {
        self.decays.clear();
        self.escapes.clear();
        self.beams.clear();
        self.nuclei.clear();
        self.primary_end = None;
    }
}

/// Columnar decay table, the reconstruction's primary input.
#[derive(Debug, Default, Clone)]
pub struct DecayTable {
    /// Event the row belongs to
    pub event_id: Vec<u32>,
    /// Emitter mass number
    pub a: Vec<i32>,
    /// Emitter atomic number
    pub z: Vec<i32>,
    /// Transverse x (mm)
    pub x: Vec<f64>,
    /// Transverse y (mm)
    pub y: Vec<f64>,
    /// Depth along the beam axis (mm)
    pub depth: Vec<f64>,
    /// Within-event decay time (s)
    pub t: Vec<f64>,
}

impl DecayTable {
    /// Number of decay rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_id.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_id.is_empty()
    }

    fn push(&mut self, event_id: u32, rec: &DecayRecord) {
        self.event_id.push(event_id);
        self.a.push(rec.a);
        self.z.push(rec.z);
        self.x.push(rec.position.x);
        self.y.push(rec.position.y);
        self.depth.push(rec.position.z);
        self.t.push(rec.time_s);
    }

    fn extend(&mut self, other: &Self) {
        self.event_id.extend_from_slice(&other.event_id);
        self.a.extend_from_slice(&other.a);
        self.z.extend_from_slice(&other.z);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.depth.extend_from_slice(&other.depth);
        self.t.extend_from_slice(&other.t);
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("event_id", DataType::UInt32, false),
            Field::new("a", DataType::Int32, false),
            Field::new("z", DataType::Int32, false),
            Field::new("x", DataType::Float64, false),
            Field::new("y", DataType::Float64, false),
            Field::new("depth", DataType::Float64, false),
            Field::new("t", DataType::Float64, false),
        ])
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.event_id.clone())),
            Arc::new(Int32Array::from(self.a.clone())),
            Arc::new(Int32Array::from(self.z.clone())),
            Arc::new(Float64Array::from(self.x.clone())),
            Arc::new(Float64Array::from(self.y.clone())),
            Arc::new(Float64Array::from(self.depth.clone())),
            Arc::new(Float64Array::from(self.t.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(Self::schema()), columns)?)
    }

    /// Load a decay table persisted by [`RecordSink::write_parquet`].
    ///
    /// # Errors
    /// Returns a configuration error if the file does not exist and a storage
    /// error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open decay table {}: {e}", path.as_ref().display()))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            let event_id = uint32_column(&batch, "event_id")?;
            let a = int32_column(&batch, "a")?;
            let z = int32_column(&batch, "z")?;
            let x = float64_column(&batch, "x")?;
            let y = float64_column(&batch, "y")?;
            let depth = float64_column(&batch, "depth")?;
            let t = float64_column(&batch, "t")?;
            for i in 0..batch.num_rows() {
                table.event_id.push(event_id.value(i));
                table.a.push(a.value(i));
                table.z.push(z.value(i));
                table.x.push(x.value(i));
                table.y.push(y.value(i));
                table.depth.push(depth.value(i));
                table.t.push(t.value(i));
            }
        }
        Ok(table)
    }
}

/// Columnar escape table.
#[derive(Debug, Default, Clone)]
pub struct EscapeTable {
    event_id: Vec<u32>,
    pdg: Vec<i32>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    theta: Vec<f64>,
    phi: Vec<f64>,
    energy: Vec<f64>,
    time: Vec<f64>,
    init_x: Vec<f64>,
    init_y: Vec<f64>,
    init_z: Vec<f64>,
}

impl EscapeTable {
    /// Number of escape rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_id.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_id.is_empty()
    }

    fn push(&mut self, event_id: u32, rec: &EscapeRecord) {
        self.event_id.push(event_id);
        self.pdg.push(rec.pdg);
        self.x.push(rec.position.x);
        self.y.push(rec.position.y);
        self.z.push(rec.position.z);
        self.theta.push(rec.theta);
        self.phi.push(rec.phi);
        self.energy.push(rec.energy_mev);
        self.time.push(rec.time_s);
        self.init_x.push(rec.initial_position.x);
        self.init_y.push(rec.initial_position.y);
        self.init_z.push(rec.initial_position.z);
    }

    fn extend(&mut self, other: &Self) {
        self.event_id.extend_from_slice(&other.event_id);
        self.pdg.extend_from_slice(&other.pdg);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.theta.extend_from_slice(&other.theta);
        self.phi.extend_from_slice(&other.phi);
        self.energy.extend_from_slice(&other.energy);
        self.time.extend_from_slice(&other.time);
        self.init_x.extend_from_slice(&other.init_x);
        self.init_y.extend_from_slice(&other.init_y);
        self.init_z.extend_from_slice(&other.init_z);
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("event_id", DataType::UInt32, false),
            Field::new("pdg", DataType::Int32, false),
            Field::new("x", DataType::Float64, false),
            Field::new("y", DataType::Float64, false),
            Field::new("z", DataType::Float64, false),
            Field::new("theta", DataType::Float64, false),
            Field::new("phi", DataType::Float64, false),
            Field::new("energy", DataType::Float64, false),
            Field::new("time", DataType::Float64, false),
            Field::new("init_x", DataType::Float64, false),
            Field::new("init_y", DataType::Float64, false),
            Field::new("init_z", DataType::Float64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.event_id.clone())),
            Arc::new(Int32Array::from(self.pdg.clone())),
            Arc::new(Float64Array::from(self.x.clone())),
            Arc::new(Float64Array::from(self.y.clone())),
            Arc::new(Float64Array::from(self.z.clone())),
            Arc::new(Float64Array::from(self.theta.clone())),
            Arc::new(Float64Array::from(self.phi.clone())),
            Arc::new(Float64Array::from(self.energy.clone())),
            Arc::new(Float64Array::from(self.time.clone())),
            Arc::new(Float64Array::from(self.init_x.clone())),
            Arc::new(Float64Array::from(self.init_y.clone())),
            Arc::new(Float64Array::from(self.init_z.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Load an escape table persisted by [`RecordSink::write_parquet`].
    ///
    /// # Errors
    /// Returns a configuration error if the file does not exist and a storage
    /// error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open escape table {}: {e}", path.as_ref().display()))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            let event_id = uint32_column(&batch, "event_id")?;
            let pdg = int32_column(&batch, "pdg")?;
            let x = float64_column(&batch, "x")?;
            let y = float64_column(&batch, "y")?;
            let z = float64_column(&batch, "z")?;
            let theta = float64_column(&batch, "theta")?;
            let phi = float64_column(&batch, "phi")?;
            let energy = float64_column(&batch, "energy")?;
            let time = float64_column(&batch, "time")?;
            let init_x = float64_column(&batch, "init_x")?;
            let init_y = float64_column(&batch, "init_y")?;
            let init_z = float64_column(&batch, "init_z")?;
            for i in 0..batch.num_rows() {
                table.event_id.push(event_id.value(i));
                table.pdg.push(pdg.value(i));
                table.x.push(x.value(i));
                table.y.push(y.value(i));
                table.z.push(z.value(i));
                table.theta.push(theta.value(i));
                table.phi.push(phi.value(i));
                table.energy.push(energy.value(i));
                table.time.push(time.value(i));
                table.init_x.push(init_x.value(i));
                table.init_y.push(init_y.value(i));
                table.init_z.push(init_z.value(i));
            }
        }
        Ok(table)
    }
}

/// Columnar beam table.
#[derive(Debug, Default, Clone)]
pub struct BeamTable {
    event_id: Vec<u32>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    dir_x: Vec<f64>,
    dir_y: Vec<f64>,
    dir_z: Vec<f64>,
    energy: Vec<f64>,
}

impl BeamTable {
    /// Number of beam rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_id.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_id.is_empty()
    }

    fn push(&mut self, event_id: u32, rec: &BeamRecord) {
        self.event_id.push(event_id);
        self.x.push(rec.position.x);
        self.y.push(rec.position.y);
        self.z.push(rec.position.z);
        self.dir_x.push(rec.direction.x);
        self.dir_y.push(rec.direction.y);
        self.dir_z.push(rec.direction.z);
        self.energy.push(rec.energy_per_nucleon_mev);
    }

    fn extend(&mut self, other: &Self) {
        self.event_id.extend_from_slice(&other.event_id);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.dir_x.extend_from_slice(&other.dir_x);
        self.dir_y.extend_from_slice(&other.dir_y);
        self.dir_z.extend_from_slice(&other.dir_z);
        self.energy.extend_from_slice(&other.energy);
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("event_id", DataType::UInt32, false),
            Field::new("x", DataType::Float64, false),
            Field::new("y", DataType::Float64, false),
            Field::new("z", DataType::Float64, false),
            Field::new("dir_x", DataType::Float64, false),
            Field::new("dir_y", DataType::Float64, false),
            Field::new("dir_z", DataType::Float64, false),
            Field::new("energy", DataType::Float64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.event_id.clone())),
            Arc::new(Float64Array::from(self.x.clone())),
            Arc::new(Float64Array::from(self.y.clone())),
            Arc::new(Float64Array::from(self.z.clone())),
            Arc::new(Float64Array::from(self.dir_x.clone())),
            Arc::new(Float64Array::from(self.dir_y.clone())),
            Arc::new(Float64Array::from(self.dir_z.clone())),
            Arc::new(Float64Array::from(self.energy.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Event id of each row.
    #[must_use]
    pub fn event_id(&self) -> &[u32] {
        &self.event_id
    }

    /// Beam energy per nucleon of each row (MeV/u).
    #[must_use]
    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    /// Load a beam table persisted by [`RecordSink::write_parquet`].
    ///
    /// # Errors
    /// Returns a configuration error if the file does not exist and a storage
    /// error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open beam table {}: {e}", path.as_ref().display()))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            let event_id = uint32_column(&batch, "event_id")?;
            let x = float64_column(&batch, "x")?;
            let y = float64_column(&batch, "y")?;
            let z = float64_column(&batch, "z")?;
            let dir_x = float64_column(&batch, "dir_x")?;
            let dir_y = float64_column(&batch, "dir_y")?;
            let dir_z = float64_column(&batch, "dir_z")?;
            let energy = float64_column(&batch, "energy")?;
            for i in 0..batch.num_rows() {
                table.event_id.push(event_id.value(i));
                table.x.push(x.value(i));
                table.y.push(y.value(i));
                table.z.push(z.value(i));
                table.dir_x.push(dir_x.value(i));
                table.dir_y.push(dir_y.value(i));
                table.dir_z.push(dir_z.value(i));
                table.energy.push(energy.value(i));
            }
        }
        Ok(table)
    }
}

/// Columnar nuclei table.
#[derive(Debug, Default, Clone)]
pub struct NucleiTable {
    event_id: Vec<u32>,
    a: Vec<i32>,
    z: Vec<i32>,
    pos_x: Vec<f64>,
    pos_y: Vec<f64>,
    pos_z: Vec<f64>,
}

impl NucleiTable {
    /// Number of nuclei rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_id.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_id.is_empty()
    }

    fn push(&mut self, event_id: u32, rec: &NucleiRecord) {
        self.event_id.push(event_id);
        self.a.push(rec.a);
        self.z.push(rec.z);
        self.pos_x.push(rec.position.x);
        self.pos_y.push(rec.position.y);
        self.pos_z.push(rec.position.z);
    }

    fn extend(&mut self, other: &Self) {
        self.event_id.extend_from_slice(&other.event_id);
        self.a.extend_from_slice(&other.a);
        self.z.extend_from_slice(&other.z);
        self.pos_x.extend_from_slice(&other.pos_x);
        self.pos_y.extend_from_slice(&other.pos_y);
        self.pos_z.extend_from_slice(&other.pos_z);
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("event_id", DataType::UInt32, false),
            Field::new("a", DataType::Int32, false),
            Field::new("z", DataType::Int32, false),
            Field::new("pos_x", DataType::Float64, false),
            Field::new("pos_y", DataType::Float64, false),
            Field::new("pos_z", DataType::Float64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.event_id.clone())),
            Arc::new(Int32Array::from(self.a.clone())),
            Arc::new(Int32Array::from(self.z.clone())),
            Arc::new(Float64Array::from(self.pos_x.clone())),
            Arc::new(Float64Array::from(self.pos_y.clone())),
            Arc::new(Float64Array::from(self.pos_z.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Load a nuclei table persisted by [`RecordSink::write_parquet`].
    ///
    /// # Errors
    /// Returns a configuration error if the file does not exist and a storage
    /// error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open nuclei table {}: {e}", path.as_ref().display()))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            let event_id = uint32_column(&batch, "event_id")?;
            let a = int32_column(&batch, "a")?;
            let z = int32_column(&batch, "z")?;
            let pos_x = float64_column(&batch, "pos_x")?;
            let pos_y = float64_column(&batch, "pos_y")?;
            let pos_z = float64_column(&batch, "pos_z")?;
            for i in 0..batch.num_rows() {
                table.event_id.push(event_id.value(i));
                table.a.push(a.value(i));
                table.z.push(z.value(i));
                table.pos_x.push(pos_x.value(i));
                table.pos_y.push(pos_y.value(i));
                table.pos_z.push(pos_z.value(i));
            }
        }
        Ok(table)
    }
}

/// Columnar primary-end table: the deepest point reached by the primary.
#[derive(Debug, Default, Clone)]
pub struct PrimaryEndTable {
    event_id: Vec<u32>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl PrimaryEndTable {
    /// Number of primary-end rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_id.len()
    }

    /// Whether the table holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_id.is_empty()
    }

    fn push(&mut self, event_id: u32, pos: &Vec3) {
        self.event_id.push(event_id);
        self.x.push(pos.x);
        self.y.push(pos.y);
        self.z.push(pos.z);
    }

    fn extend(&mut self, other: &Self) {
        self.event_id.extend_from_slice(&other.event_id);
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
    }

    fn to_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("event_id", DataType::UInt32, false),
            Field::new("x", DataType::Float64, false),
            Field::new("y", DataType::Float64, false),
            Field::new("z", DataType::Float64, false),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(self.event_id.clone())),
            Arc::new(Float64Array::from(self.x.clone())),
            Arc::new(Float64Array::from(self.y.clone())),
            Arc::new(Float64Array::from(self.z.clone())),
        ];
        Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
    }

    /// Load a primary-end table persisted by [`RecordSink::write_parquet`].
    ///
    /// # Errors
    /// Returns a configuration error if the file does not exist and a storage
    /// error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot open primary-end table {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut table = Self::default();
        for batch in reader {
            let batch = batch?;
            let event_id = uint32_column(&batch, "event_id")?;
            let x = float64_column(&batch, "x")?;
            let y = float64_column(&batch, "y")?;
            let z = float64_column(&batch, "z")?;
            for i in 0..batch.num_rows() {
                table.event_id.push(event_id.value(i));
                table.x.push(x.value(i));
                table.y.push(y.value(i));
                table.z.push(z.value(i));
            }
        }
        Ok(table)
    }
}

/// Per-event record sink with append-only persistent tables.
#[derive(Debug, Default)]
pub struct RecordSink {
    current_event: Option<u32>,
    buffer: EventBuffer,
    decay: DecayTable,
    escape: EscapeTable,
    beam: BeamTable,
    nuclei: NucleiTable,
    primary_end: PrimaryEndTable,
    edep: EdepHistogram,
}

impl RecordSink {
    /// Create an empty sink with the standard deposit grid.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an event. All records buffered until [`flush_event`](Self::flush_event)
    /// are tagged with `event_id`.
    ///
    /// # Panics
    /// Panics if an event is already open: two concurrently open events on
    /// one sink indicate a broken callback sequence.
    pub fn begin_event(&mut self, event_id: u32) {
        assert!(
            self.current_event.is_none(),
            "event {event_id} opened while event {:?} is still open",
            self.current_event
        );
        self.current_event = Some(event_id);
    }

    /// Event currently open, if any.
    #[must_use]
    pub const fn current_event(&self) -> Option<u32> {
        self.current_event
    }

    /// Buffer a decay record for the open event.
    pub fn add_decay(&mut self, rec: DecayRecord) {
        self.buffer.decays.push(rec);
    }

    /// Buffer an escape record for the open event.
    pub fn add_escape(&mut self, rec: EscapeRecord) {
        self.buffer.escapes.push(rec);
    }

    /// Buffer the primary-beam properties of the open event.
    pub fn add_beam(&mut self, rec: BeamRecord) {
        self.buffer.beams.push(rec);
    }

    /// Buffer a nuclei observation for the open event.
    pub fn add_nuclei(&mut self, rec: NucleiRecord) {
        self.buffer.nuclei.push(rec);
    }

    /// Record the deepest point reached by the primary track.
    pub fn set_primary_end(&mut self, pos: Vec3) {
        self.buffer.primary_end = Some(pos);
    }

    /// Add an energy deposit to the run-scoped dose grid.
    pub fn fill_edep(&mut self, z_mm: f64, x_mm: f64, de_mev: f64) {
        self.edep.fill(z_mm, x_mm, de_mev);
    }

    /// Persist the buffered records of the open event into the tables and
    /// close the event.
    ///
    /// # Panics
    /// Panics if no event is open.
    pub fn flush_event(&mut self) {
        let event_id = self.current_event.take().expect("flush_event with no open event");

        for rec in &self.buffer.decays {
            self.decay.push(event_id, rec);
        }
        for rec in &self.buffer.escapes {
            self.escape.push(event_id, rec);
        }
        for rec in &self.buffer.beams {
            self.beam.push(event_id, rec);
        }
        for rec in &self.buffer.nuclei {
            self.nuclei.push(event_id, rec);
        }
        if let Some(pos) = self.buffer.primary_end {
            self.primary_end.push(event_id, &pos);
        }

        self.buffer.clear();
    }

    /// The persisted decay table.
    #[must_use]
    pub const fn decay(&self) -> &DecayTable {
        &self.decay
    }

    /// The persisted escape table.
    #[must_use]
    pub const fn escape(&self) -> &EscapeTable {
        &self.escape
    }

    /// The persisted beam table.
    #[must_use]
    pub const fn beam(&self) -> &BeamTable {
        &self.beam
    }

    /// The persisted nuclei table.
    #[must_use]
    pub const fn nuclei(&self) -> &NucleiTable {
        &self.nuclei
    }

    /// The persisted primary-end table.
    #[must_use]
    pub const fn primary_end(&self) -> &PrimaryEndTable {
        &self.primary_end
    }

    /// The run-scoped deposit grid.
    #[must_use]
    pub const fn edep(&self) -> &EdepHistogram {
        &self.edep
    }

    /// Terminal merge of worker partitions: tables are concatenated in the
    /// given order, deposit grids are summed.
    ///
    /// # Panics
    /// Panics if any partition still has an open event.
    #[must_use]
    pub fn merge(partitions: Vec<Self>) -> Self {
        let mut merged = Self::new();
        for part in &partitions {
            assert!(
                part.current_event.is_none(),
                "merging a sink partition with an open event"
            );
            merged.decay.extend(&part.decay);
            merged.escape.extend(&part.escape);
            merged.beam.extend(&part.beam);
            merged.nuclei.extend(&part.nuclei);
            merged.primary_end.extend(&part.primary_end);
            merged.edep.merge(&part.edep);
        }
        merged
    }

    /// Write one Parquet file per table:
    /// `<stem>.decay.parquet`, `.escape.`, `.beam.`, `.nuclei.`,
    /// `.primary_end.`, `.edep.`.
    ///
    /// # Errors
    /// Returns error on any IO or encoding failure.
    pub fn write_parquet<P: AsRef<Path>>(&self, stem: P) -> Result<Vec<PathBuf>> {
        let stem = stem.as_ref();
        let mut written = Vec::new();

        let tables: [(&str, RecordBatch); 5] = [
            ("decay", self.decay.to_batch()?),
            ("escape", self.escape.to_batch()?),
            ("beam", self.beam.to_batch()?),
            ("nuclei", self.nuclei.to_batch()?),
            ("primary_end", self.primary_end.to_batch()?),
        ];

        for (name, batch) in tables {
            let path = table_path(stem, name);
            let file = File::create(&path)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;
            written.push(path);
        }

        let edep_path = table_path(stem, "edep");
        self.edep.write_parquet(&edep_path)?;
        written.push(edep_path);

        Ok(written)
    }

    /// Reassemble a sink from the six Parquet files written by
    /// [`write_parquet`](Self::write_parquet). The collator uses this to merge
    /// persisted worker partitions.
    ///
    /// # Errors
    /// Returns a configuration error if any table file is missing and a
    /// storage error if columns are missing or mistyped.
    pub fn load_parquet<P: AsRef<Path>>(stem: P) -> Result<Self> {
        let stem = stem.as_ref();
        Ok(Self {
            current_event: None,
            buffer: EventBuffer::default(),
            decay: DecayTable::load_parquet(table_path(stem, "decay"))?,
            escape: EscapeTable::load_parquet(table_path(stem, "escape"))?,
            beam: BeamTable::load_parquet(table_path(stem, "beam"))?,
            nuclei: NucleiTable::load_parquet(table_path(stem, "nuclei"))?,
            primary_end: PrimaryEndTable::load_parquet(table_path(stem, "primary_end"))?,
            edep: EdepHistogram::load_parquet(table_path(stem, "edep"))?,
        })
    }
}

/// Path of one logical table for a given run stem.
#[must_use]
pub fn table_path(stem: &Path, table: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(format!(".{table}.parquet"));
    PathBuf::from(name)
}

pub(crate) fn uint32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Storage(format!("missing column: {name}")))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| Error::Storage(format!("column {name} is not UInt32")))
}

pub(crate) fn int32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Storage(format!("missing column: {name}")))?
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| Error::Storage(format!("column {name} is not Int32")))
}

pub(crate) fn float64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Storage(format!("missing column: {name}")))?
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Storage(format!("column {name} is not Float64")))
}
