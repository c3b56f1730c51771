//! Flow directory production and loading.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::imageops::{self, FilterType};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info};

use super::FlowEstimator;
use crate::error::{MediaError, MediaResult};
use crate::frames::FrameSequence;
use crate::imaging::{
    array_to_gray, gray_to_array, load_gray, load_luma, write_gray_jpeg, FLOW_JPEG_QUALITY,
};

/// The two quantized images of one transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPair {
    /// Transition index; the pair describes motion from frame `index` to `index + 1`
    pub index: usize,
    pub x: PathBuf,
    pub y: PathBuf,
}

impl FlowPair {
    fn in_dir(dir: &Path, index: usize) -> Self {
        Self {
            index,
            x: dir.join(format!("X{index:03}.jpg")),
            y: dir.join(format!("Y{index:03}.jpg")),
        }
    }
}

/// Ordered flow pairs in a flow directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowFieldSet {
    pairs: Vec<FlowPair>,
}

impl FlowFieldSet {
    /// Read an existing flow directory.
    ///
    /// Indices must be contiguous from zero and every `X` needs its `Y`.
    pub fn from_dir(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref();
        let mut xs = Vec::new();
        let mut ys = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            match parse_flow_name(&name) {
                Some(('X', index)) => xs.push(index),
                Some(('Y', index)) => ys.push(index),
                _ => {}
            }
        }

        xs.sort_unstable();
        ys.sort_unstable();
        if xs != ys {
            return Err(MediaError::invalid_layout(dir, "unpaired X/Y flow images"));
        }
        if xs.iter().enumerate().any(|(expected, &index)| expected != index) {
            return Err(MediaError::invalid_layout(dir, "flow indices are not contiguous"));
        }

        Ok(Self {
            pairs: xs.into_iter().map(|i| FlowPair::in_dir(dir, i)).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FlowPair> {
        self.pairs.get(index)
    }

    pub fn pairs(&self) -> &[FlowPair] {
        &self.pairs
    }
}

fn parse_flow_name(name: &str) -> Option<(char, usize)> {
    let stem = name.strip_suffix(".jpg")?;
    let mut chars = stem.chars();
    let axis = chars.next().filter(|c| *c == 'X' || *c == 'Y')?;
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((axis, digits.parse().ok()?))
}

/// Compute flow for every consecutive frame pair and write `X<NNN>.jpg` /
/// `Y<NNN>.jpg` into `out_dir`.
///
/// Blocking; runs inside `pool`. Fewer than two frames yields an empty set.
/// Frames are decoded per transition, so only the pairs in flight are held in
/// memory.
pub fn compute_flows(
    frames: &FrameSequence,
    out_dir: &Path,
    estimator: &dyn FlowEstimator,
    pool: &rayon::ThreadPool,
) -> MediaResult<FlowFieldSet> {
    if frames.len() < 2 {
        debug!(frames = frames.len(), "Not enough frames for optical flow");
        return Ok(FlowFieldSet::default());
    }

    let start = Instant::now();
    let transitions = frames.len() - 1;

    let files = frames.files();
    let pairs = pool.install(|| -> MediaResult<Vec<FlowPair>> {
        (0..transitions)
            .into_par_iter()
            .map(|index| -> MediaResult<FlowPair> {
                let prev = load_gray(&files[index])?;
                let next = load_gray(&files[index + 1])?;
                let field = estimator
                    .estimate(&prev, &next)
                    .map_err(|e| MediaError::flow_failed(index, e.to_string()))?;
                let (qx, qy) = field.quantized();

                let pair = FlowPair::in_dir(out_dir, index);
                write_gray_jpeg(&pair.x, &array_to_gray(&qx), FLOW_JPEG_QUALITY)?;
                write_gray_jpeg(&pair.y, &array_to_gray(&qy), FLOW_JPEG_QUALITY)?;
                Ok(pair)
            })
            .collect()
    })?;

    info!(
        estimator = estimator.name(),
        transitions,
        threads = pool.current_num_threads(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Computed optical flow"
    );

    Ok(FlowFieldSet { pairs })
}

/// Quantized flow images held in memory, all at one `(height, width)`.
///
/// Only the transitions some stack reads are loaded; lookups on any other
/// index miss.
#[derive(Debug, Clone)]
pub struct LoadedFlows {
    shape: (usize, usize),
    fields: BTreeMap<usize, (Array2<u8>, Array2<u8>)>,
}

impl LoadedFlows {
    /// No transitions; every lookup misses.
    pub fn empty(shape: (usize, usize)) -> Self {
        Self {
            shape,
            fields: BTreeMap::new(),
        }
    }

    /// Load the transitions `start..start + window` for every start in
    /// `starts`, in parallel, resizing to `shape` where needed.
    pub fn load_windows(
        set: &FlowFieldSet,
        shape: (usize, usize),
        starts: &[usize],
        window: usize,
    ) -> MediaResult<Self> {
        let needed: BTreeSet<usize> = starts
            .iter()
            .flat_map(|&start| start..start.saturating_add(window).min(set.len()))
            .collect();

        let fields = needed
            .into_par_iter()
            .map(|index| -> MediaResult<(usize, (Array2<u8>, Array2<u8>))> {
                let pair = set.get(index).ok_or_else(|| {
                    MediaError::flow_failed(index, "transition missing from flow set")
                })?;
                let field = (load_resized(&pair.x, shape)?, load_resized(&pair.y, shape)?);
                Ok((index, field))
            })
            .collect::<MediaResult<Vec<_>>>()?;

        debug!(
            loaded = fields.len(),
            transitions = set.len(),
            "Loaded flow windows"
        );
        Ok(Self {
            shape,
            fields: fields.into_iter().collect(),
        })
    }

    /// Wrap already-quantized fields. All must match `shape`.
    pub fn from_fields(
        shape: (usize, usize),
        fields: Vec<(Array2<u8>, Array2<u8>)>,
    ) -> MediaResult<Self> {
        if let Some(i) = fields
            .iter()
            .position(|(x, y)| x.dim() != shape || y.dim() != shape)
        {
            return Err(MediaError::flow_failed(i, "flow field shape mismatch"));
        }
        Ok(Self {
            shape,
            fields: fields.into_iter().enumerate().collect(),
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of transitions held in memory.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `(dx, dy)` of transition `index`.
    pub fn get(&self, index: usize) -> Option<(&Array2<u8>, &Array2<u8>)> {
        self.fields.get(&index).map(|(x, y)| (x, y))
    }
}

fn load_resized(path: &Path, (h, w): (usize, usize)) -> MediaResult<Array2<u8>> {
    let img = load_luma(path)?;
    if img.dimensions() == (w as u32, h as u32) {
        return Ok(gray_to_array(&img));
    }
    let resized = imageops::resize(&img, w as u32, h as u32, FilterType::Triangle);
    Ok(gray_to_array(&resized))
}
