//! Variation regions, delta computation and the ItemVariationStore

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap, HashSet},
};

use indexmap::IndexMap;
use otl_types::F2Dot14;

use crate::{
    error::Error,
    write::{FontWrite, TableWriter},
};

/// The peak and extent of a region along one axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionAxisCoordinates {
    pub start_coord: F2Dot14,
    pub peak_coord: F2Dot14,
    pub end_coord: F2Dot14,
}

/// A region of the design space, one entry per axis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariationRegion {
    pub region_axes: Vec<RegionAxisCoordinates>,
}

/// An index into an [`ItemVariationStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariationIndex {
    pub outer: u16,
    pub inner: u16,
}

/// A temporary identifier for a set of deltas, assigned before the
/// variation store is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeltaSetId(u32);

/// A map from the temporary delta set identifiers to the final values.
///
/// This is generated when the [ItemVariationStore] is built; afterwards
/// any VariationIndex table is written with the remapped value.
#[derive(Clone, Debug, Default)]
pub struct VariationIndexRemapping {
    map: HashMap<DeltaSetId, VariationIndex>,
}

/// Computes per-region deltas from the values of masters.
///
/// Each non-default master location gets one region, derived the way
/// fontTools does it: along each axis the region spans from zero, through
/// the master's coordinate, to the furthest coordinate used by any master in
/// that direction. Masters are processed in an order where masters with
/// fewer non-zero axes (and masters at the extremes) come first, and each
/// master's delta is what remains once the contributions of earlier regions
/// are subtracted.
#[derive(Clone, Debug)]
pub struct VariationModel {
    axis_count: u16,
    locations: Vec<Vec<F2Dot14>>,
    regions: Vec<VariationRegion>,
    // master (location) indices, in processing order
    order: Vec<usize>,
    // scalars[i][j] is the scalar of the region of order[j] at the location
    // of order[i], for all j < i
    scalars: Vec<Vec<f64>>,
}

impl VariationModel {
    /// Create a model from normalized master locations.
    ///
    /// Locations are referred to by their index in `locations`. The default
    /// location is implicit and must not be included.
    pub fn new(axis_count: u16, locations: Vec<Vec<F2Dot14>>) -> Result<Self, Error> {
        let mut seen = HashSet::new();
        for loc in &locations {
            if loc.len() != axis_count as usize {
                return Err(Error::InvalidVariationModel(format!(
                    "location has {} coordinates, expected {axis_count}",
                    loc.len()
                )));
            }
            if loc.iter().all(|v| *v == F2Dot14::ZERO) {
                return Err(Error::InvalidVariationModel(
                    "the default location is implicit".into(),
                ));
            }
            if !seen.insert(loc.clone()) {
                return Err(Error::InvalidVariationModel(format!(
                    "duplicate location {loc:?}"
                )));
            }
        }

        let regions = locations_to_regions(axis_count, &locations);
        let mut order = (0..locations.len()).collect::<Vec<_>>();
        order.sort_by_key(|ix| sort_key(&locations[*ix], &regions[*ix]));

        let scalars = order
            .iter()
            .enumerate()
            .map(|(i, loc_ix)| {
                order[..i]
                    .iter()
                    .map(|reg_ix| region_scalar(&regions[*reg_ix], &locations[*loc_ix]))
                    .collect()
            })
            .collect();

        Ok(VariationModel {
            axis_count,
            locations,
            regions,
            order,
            scalars,
        })
    }

    pub fn axis_count(&self) -> u16 {
        self.axis_count
    }

    /// The number of non-default master locations.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }

    /// The region used for the master at `location`.
    pub fn region(&self, location: usize) -> Option<&VariationRegion> {
        self.regions.get(location)
    }

    /// Compute the region deltas for a value.
    ///
    /// `master_deltas` maps location indices to the difference between the
    /// value at that location and the default; missing locations have no
    /// difference. Returns `None` if a location index is out of range.
    pub fn region_deltas(
        &self,
        master_deltas: &BTreeMap<u16, i16>,
    ) -> Option<Vec<(VariationRegion, i32)>> {
        if master_deltas
            .keys()
            .any(|ix| *ix as usize >= self.locations.len())
        {
            return None;
        }
        let mut out: Vec<i32> = Vec::with_capacity(self.order.len());
        for (i, loc_ix) in self.order.iter().enumerate() {
            let mut delta = master_deltas.get(&(*loc_ix as u16)).copied().unwrap_or(0) as f64;
            for (j, scalar) in self.scalars[i].iter().enumerate() {
                delta -= out[j] as f64 * scalar;
            }
            out.push(delta.round() as i32);
        }
        Some(
            self.order
                .iter()
                .zip(out)
                .map(|(loc_ix, delta)| (self.regions[*loc_ix].clone(), delta))
                .collect(),
        )
    }
}

fn locations_to_regions(axis_count: u16, locations: &[Vec<F2Dot14>]) -> Vec<VariationRegion> {
    let mut min = vec![F2Dot14::ZERO; axis_count as usize];
    let mut max = vec![F2Dot14::ZERO; axis_count as usize];
    for loc in locations {
        for (axis, value) in loc.iter().enumerate() {
            min[axis] = min[axis].min(*value);
            max[axis] = max[axis].max(*value);
        }
    }
    locations
        .iter()
        .map(|loc| VariationRegion {
            region_axes: loc
                .iter()
                .enumerate()
                .map(|(axis, peak)| {
                    let (start_coord, end_coord) = match peak.to_bits().signum() {
                        1 => (F2Dot14::ZERO, max[axis]),
                        -1 => (min[axis], F2Dot14::ZERO),
                        _ => (F2Dot14::ZERO, F2Dot14::ZERO),
                    };
                    RegionAxisCoordinates {
                        start_coord,
                        peak_coord: *peak,
                        end_coord,
                    }
                })
                .collect(),
        })
        .collect()
}

// masters with fewer active axes first; among those, masters sitting at the
// end of their region's extent first, then by distance from the default.
fn sort_key(
    location: &[F2Dot14],
    region: &VariationRegion,
) -> (usize, Reverse<usize>, Vec<(u16, i16)>) {
    let rank = location.iter().filter(|v| **v != F2Dot14::ZERO).count();
    let on_extreme = region
        .region_axes
        .iter()
        .filter(|axis| {
            axis.peak_coord != F2Dot14::ZERO
                && (axis.peak_coord == axis.start_coord || axis.peak_coord == axis.end_coord)
        })
        .count();
    let coords = location
        .iter()
        .map(|v| (v.to_bits().unsigned_abs(), v.to_bits().signum()))
        .collect();
    (rank, Reverse(on_extreme), coords)
}

/// The scalar of a region at a location, in the range `0.0..=1.0`.
pub(crate) fn region_scalar(region: &VariationRegion, location: &[F2Dot14]) -> f64 {
    let mut scalar = 1.0;
    for (axis, coord) in region.region_axes.iter().zip(location) {
        let (start, peak, end) = (
            axis.start_coord.to_f32() as f64,
            axis.peak_coord.to_f32() as f64,
            axis.end_coord.to_f32() as f64,
        );
        let v = coord.to_f32() as f64;
        if peak == 0.0 || v == peak {
            continue;
        }
        if v <= start.min(peak) || v >= end.max(peak) {
            return 0.0;
        }
        scalar *= if v < peak {
            (v - start) / (peak - start)
        } else {
            (end - v) / (end - peak)
        };
    }
    scalar
}

/// A builder for the [ItemVariationStore].
///
/// This handles assigning VariationIndex values to unique sets of deltas and
/// grouping delta sets into [ItemVariationData] subtables.
#[derive(Clone, Debug, Default)]
pub struct VariationStoreBuilder {
    // region -> index map
    all_regions: HashMap<VariationRegion, usize>,
    delta_sets: IndexMap<DeltaSet, DeltaSetId>,
    axis_count: u16,
}

/// Always sorted, so we can ensure equality
///
/// Each tuple is (region index, delta value)
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
struct DeltaSet(Vec<(u16, i32)>);

impl VariationStoreBuilder {
    pub fn new(axis_count: u16) -> Self {
        Self {
            axis_count,
            ..Default::default()
        }
    }

    /// Returns `true` if no deltas have been added to this builder
    pub fn is_empty(&self) -> bool {
        self.delta_sets.is_empty()
    }

    pub fn add_deltas(&mut self, deltas: Vec<(VariationRegion, i32)>) -> DeltaSetId {
        let mut delta_set = Vec::with_capacity(deltas.len());
        for (region, delta) in deltas {
            if delta == 0 {
                continue;
            }
            let region_idx = self.canonical_index_for_region(region) as u16;
            delta_set.push((region_idx, delta));
        }
        delta_set.sort_unstable();
        let next_id = DeltaSetId(self.delta_sets.len() as u32);
        *self.delta_sets.entry(DeltaSet(delta_set)).or_insert(next_id)
    }

    fn canonical_index_for_region(&mut self, region: VariationRegion) -> usize {
        let next_idx = self.all_regions.len();
        *self.all_regions.entry(region).or_insert(next_idx)
    }

    /// Build the `ItemVariationStore` table
    ///
    /// This also returns a structure that can be used to remap the temporarily
    /// assigned delta set Ids to their final `VariationIndex` values.
    pub fn build(self) -> (ItemVariationStore, VariationIndexRemapping) {
        let mut regions = self.all_regions.into_iter().collect::<Vec<_>>();
        regions.sort_unstable_by_key(|(_, idx)| *idx);
        let regions = regions.into_iter().map(|(reg, _)| reg).collect();

        // group delta sets that can share an encoding
        let mut encodings: IndexMap<RowShape, Vec<(&DeltaSet, DeltaSetId)>> = IndexMap::new();
        for (delta_set, id) in &self.delta_sets {
            encodings
                .entry(RowShape::for_deltas(delta_set))
                .or_default()
                .push((delta_set, *id));
        }
        log::trace!(
            "encoding {} delta sets with {} row shapes",
            self.delta_sets.len(),
            encodings.len()
        );

        let mut key_map = VariationIndexRemapping::default();
        let mut subtables = Vec::new();
        for (shape, deltas) in encodings {
            // each ItemVariationData holds at most 0xFFFF items
            for chunk in deltas.chunks(u16::MAX as usize) {
                let outer = subtables.len() as u16;
                for (inner, (_, id)) in chunk.iter().enumerate() {
                    key_map.set(
                        *id,
                        VariationIndex {
                            outer,
                            inner: inner as u16,
                        },
                    );
                }
                subtables.push(ItemVariationData::new(&shape, chunk));
            }
        }
        let store = ItemVariationStore {
            axis_count: self.axis_count,
            regions,
            subtables,
        };
        (store, key_map)
    }
}

impl VariationIndexRemapping {
    fn set(&mut self, from: DeltaSetId, to: VariationIndex) {
        self.map.insert(from, to);
    }

    pub fn get(&self, from: DeltaSetId) -> Option<VariationIndex> {
        self.map.get(&from).copied()
    }
}

/// The number of bytes needed to store a delta column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ColumnBits {
    One = 1,
    Two = 2,
    Four = 4,
}

impl ColumnBits {
    fn for_val(val: i32) -> Self {
        if i8::try_from(val).is_ok() {
            Self::One
        } else if i16::try_from(val).is_ok() {
            Self::Two
        } else {
            Self::Four
        }
    }
}

/// The region columns of a row and how wide each is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct RowShape(BTreeMap<u16, ColumnBits>);

impl RowShape {
    fn for_deltas(deltas: &DeltaSet) -> Self {
        RowShape(
            deltas
                .0
                .iter()
                .map(|(region, delta)| (*region, ColumnBits::for_val(*delta)))
                .collect(),
        )
    }
}

/// One subtable of an [`ItemVariationStore`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemVariationData {
    // word columns first, then byte columns
    region_indexes: Vec<u16>,
    word_count: u16,
    long_words: bool,
    rows: Vec<Vec<i32>>,
}

impl ItemVariationData {
    fn new(shape: &RowShape, deltas: &[(&DeltaSet, DeltaSetId)]) -> Self {
        let long_words = shape.0.values().any(|bits| *bits == ColumnBits::Four);
        let is_word = |bits: ColumnBits| {
            if long_words {
                bits == ColumnBits::Four
            } else {
                bits == ColumnBits::Two
            }
        };
        let mut region_indexes = shape
            .0
            .iter()
            .filter(|(_, bits)| is_word(**bits))
            .map(|(region, _)| *region)
            .collect::<Vec<_>>();
        let word_count = region_indexes.len() as u16;
        region_indexes.extend(
            shape
                .0
                .iter()
                .filter(|(_, bits)| !is_word(**bits))
                .map(|(region, _)| *region),
        );
        let rows = deltas
            .iter()
            .map(|(delta_set, _)| {
                let lookup = delta_set.0.iter().copied().collect::<HashMap<_, _>>();
                region_indexes
                    .iter()
                    .map(|region| lookup.get(region).copied().unwrap_or(0))
                    .collect()
            })
            .collect();
        ItemVariationData {
            region_indexes,
            word_count,
            long_words,
            rows,
        }
    }

    fn row_size(&self) -> usize {
        let (word, small) = if self.long_words { (4, 2) } else { (2, 1) };
        let n_word = self.word_count as usize;
        n_word * word + (self.region_indexes.len() - n_word) * small
    }

    fn size(&self) -> usize {
        6 + 2 * self.region_indexes.len() + self.rows.len() * self.row_size()
    }
}

impl FontWrite for ItemVariationData {
    fn write_into(&self, writer: &mut TableWriter) {
        let long_flag = if self.long_words { 0x8000 } else { 0 };
        writer.write(&(self.rows.len() as u16));
        writer.write(&(self.word_count | long_flag));
        writer.write(&(self.region_indexes.len() as u16));
        writer.write(self.region_indexes.as_slice());
        let n_word = self.word_count as usize;
        for row in &self.rows {
            for (i, delta) in row.iter().enumerate() {
                // values were sized to fit their column when the shape was made
                match (self.long_words, i < n_word) {
                    (true, true) => writer.write(delta),
                    (true, false) | (false, true) => writer.write(&(*delta as i16)),
                    (false, false) => writer.write(&(*delta as i8)),
                }
            }
        }
    }
}

/// The [ItemVariationStore](https://learn.microsoft.com/en-us/typography/opentype/spec/otvarcommonformats#item-variation-store) table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemVariationStore {
    axis_count: u16,
    regions: Vec<VariationRegion>,
    subtables: Vec<ItemVariationData>,
}

impl ItemVariationStore {
    fn region_list_size(&self) -> usize {
        4 + self.regions.len() * self.axis_count as usize * 6
    }

    pub fn size(&self) -> usize {
        8 + 4 * self.subtables.len()
            + self.region_list_size()
            + self
                .subtables
                .iter()
                .map(ItemVariationData::size)
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.subtables.is_empty()
    }
}

impl FontWrite for ItemVariationStore {
    fn write_into(&self, writer: &mut TableWriter) {
        let header_len = 8 + 4 * self.subtables.len();
        writer.write(&1u16);
        writer.write(&(header_len as u32));
        writer.write(&(self.subtables.len() as u16));
        let mut pos = header_len + self.region_list_size();
        for subtable in &self.subtables {
            writer.write(&(pos as u32));
            pos += subtable.size();
        }
        writer.write(&self.axis_count);
        writer.write(&(self.regions.len() as u16));
        for region in &self.regions {
            for axis in &region.region_axes {
                writer.write(&axis.start_coord);
                writer.write(&axis.peak_coord);
                writer.write(&axis.end_coord);
            }
        }
        for subtable in &self.subtables {
            writer.write(subtable);
        }
    }
}
