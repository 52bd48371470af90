//! Value records, anchors, and the pool that owns them
//!
//! GPOS rules refer to values and anchors through [`ValueIndex`] and
//! [`AnchorIndex`] handles. Values may vary: each metric has a default and a
//! sparse set of deltas at master locations, which are turned into entries
//! of an item variation store when the subtable using them is built.

use std::collections::{BTreeMap, HashMap};

use crate::{
    error::{Error, Overflow},
    variations::{
        DeltaSetId, ItemVariationStore, VariationIndex, VariationIndexRemapping, VariationModel,
        VariationStoreBuilder,
    },
    write::TableWriter,
};

bitflags::bitflags! {
    /// [ValueFormat](https://learn.microsoft.com/en-us/typography/opentype/spec/gpos#valueRecord) flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ValueFormat: u16 {
        const X_PLACEMENT = 0x0001;
        const Y_PLACEMENT = 0x0002;
        const X_ADVANCE = 0x0004;
        const Y_ADVANCE = 0x0008;
        const X_PLACEMENT_DEVICE = 0x0010;
        const Y_PLACEMENT_DEVICE = 0x0020;
        const X_ADVANCE_DEVICE = 0x0040;
        const Y_ADVANCE_DEVICE = 0x0080;
    }
}

impl ValueFormat {
    /// The size of a value record with this format, in bytes.
    pub fn record_size(self) -> usize {
        self.bits().count_ones() as usize * 2
    }

    fn value_bit(field: usize) -> Self {
        Self::from_bits_truncate(1 << field)
    }

    fn device_bit(field: usize) -> Self {
        Self::from_bits_truncate(0x10 << field)
    }
}

/// A single design-unit value, optionally with deltas at master locations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metric {
    pub default: i16,
    /// Location index → (value at that location - default)
    pub deltas: BTreeMap<u16, i16>,
}

impl Metric {
    pub fn new(default: i16) -> Self {
        Metric {
            default,
            deltas: BTreeMap::new(),
        }
    }

    pub fn with_delta(mut self, location: u16, delta: i16) -> Self {
        self.deltas.insert(location, delta);
        self
    }

    pub fn is_variable(&self) -> bool {
        self.deltas.values().any(|delta| *delta != 0)
    }
}

impl From<i16> for Metric {
    fn from(value: i16) -> Self {
        Metric::new(value)
    }
}

/// A [ValueRecord](https://learn.microsoft.com/en-us/typography/opentype/spec/gpos#valueRecord),
/// before variation indices are assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRecord {
    pub x_placement: Option<Metric>,
    pub y_placement: Option<Metric>,
    pub x_advance: Option<Metric>,
    pub y_advance: Option<Metric>,
}

impl ValueRecord {
    pub fn new() -> ValueRecord {
        ValueRecord::default()
    }

    pub fn with_x_placement(mut self, val: impl Into<Metric>) -> Self {
        self.x_placement = Some(val.into());
        self
    }

    pub fn with_y_placement(mut self, val: impl Into<Metric>) -> Self {
        self.y_placement = Some(val.into());
        self
    }

    pub fn with_x_advance(mut self, val: impl Into<Metric>) -> Self {
        self.x_advance = Some(val.into());
        self
    }

    pub fn with_y_advance(mut self, val: impl Into<Metric>) -> Self {
        self.y_advance = Some(val.into());
        self
    }

    fn fields(&self) -> [Option<&Metric>; 4] {
        [
            self.x_placement.as_ref(),
            self.y_placement.as_ref(),
            self.x_advance.as_ref(),
            self.y_advance.as_ref(),
        ]
    }

    /// The [ValueFormat] of this record.
    ///
    /// Variable metrics also set the corresponding device flag.
    pub fn format(&self) -> ValueFormat {
        let mut format = ValueFormat::empty();
        for (i, field) in self.fields().into_iter().enumerate() {
            if let Some(metric) = field {
                format |= ValueFormat::value_bit(i);
                if metric.is_variable() {
                    format |= ValueFormat::device_bit(i);
                }
            }
        }
        format
    }
}

/// An [Anchor](https://learn.microsoft.com/en-us/typography/opentype/spec/gpos#anchor-tables),
/// before variation indices are assigned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Anchor {
    pub x: Metric,
    pub y: Metric,
    pub contour_point: Option<u16>,
}

impl Anchor {
    pub fn new(x: impl Into<Metric>, y: impl Into<Metric>) -> Self {
        Anchor {
            x: x.into(),
            y: y.into(),
            contour_point: None,
        }
    }

    pub fn with_contour_point(mut self, point: u16) -> Self {
        self.contour_point = Some(point);
        self
    }
}

/// A handle to a [`ValueRecord`] in a [`ValuePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueIndex(u32);

/// A handle to an [`Anchor`] in a [`ValuePool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnchorIndex(u32);

/// Owns every value record and anchor used by a build.
///
/// Indices remain valid for the lifetime of the pool. Identical records are
/// not merged; rules compare the records themselves when looking for
/// conflicts.
#[derive(Clone, Debug, Default)]
pub struct ValuePool {
    values: Vec<ValueRecord>,
    anchors: Vec<Anchor>,
    model: Option<VariationModel>,
    store: VariationStoreBuilder,
    resolved_values: HashMap<ValueIndex, ResolvedValue>,
    resolved_anchors: HashMap<AnchorIndex, ResolvedAnchor>,
}

impl ValuePool {
    pub fn add_value(&mut self, value: ValueRecord) -> ValueIndex {
        let ix = ValueIndex(self.values.len() as u32);
        self.values.push(value);
        ix
    }

    pub fn add_anchor(&mut self, anchor: Anchor) -> AnchorIndex {
        let ix = AnchorIndex(self.anchors.len() as u32);
        self.anchors.push(anchor);
        ix
    }

    pub fn value(&self, ix: ValueIndex) -> &ValueRecord {
        &self.values[ix.0 as usize]
    }

    pub fn anchor(&self, ix: AnchorIndex) -> &Anchor {
        &self.anchors[ix.0 as usize]
    }

    pub(crate) fn set_variation_model(&mut self, model: VariationModel) {
        self.store = VariationStoreBuilder::new(model.axis_count());
        self.model = Some(model);
    }

    pub(crate) fn resolve_metric(
        &mut self,
        metric: &Metric,
        context: &str,
    ) -> Result<ResolvedMetric, Error> {
        let mut resolved = ResolvedMetric {
            value: metric.default,
            var: None,
        };
        if !metric.is_variable() {
            return Ok(resolved);
        }
        let Some(model) = self.model.as_ref() else {
            return Err(Error::MissingVariationModel {
                context: context.to_owned(),
            });
        };
        let deltas = model.region_deltas(&metric.deltas).ok_or_else(|| {
            Error::InvalidVariationModel(format!(
                "{context}: value refers to a location outside of the {} known locations",
                model.location_count()
            ))
        })?;
        if deltas.iter().any(|(_, delta)| *delta != 0) {
            resolved.var = Some(self.store.add_deltas(deltas));
        }
        Ok(resolved)
    }

    pub(crate) fn resolve_value(
        &mut self,
        ix: ValueIndex,
        context: &str,
    ) -> Result<ResolvedValue, Error> {
        if let Some(resolved) = self.resolved_values.get(&ix) {
            return Ok(resolved.clone());
        }
        let record = self.values[ix.0 as usize].clone();
        let mut resolved = ResolvedValue::default();
        for (i, field) in record.fields().into_iter().enumerate() {
            if let Some(metric) = field {
                resolved.fields[i] = Some(self.resolve_metric(metric, context)?);
            }
        }
        self.resolved_values.insert(ix, resolved.clone());
        Ok(resolved)
    }

    pub(crate) fn resolve_anchor(
        &mut self,
        ix: AnchorIndex,
        context: &str,
    ) -> Result<ResolvedAnchor, Error> {
        if let Some(resolved) = self.resolved_anchors.get(&ix) {
            return Ok(resolved.clone());
        }
        let anchor = self.anchors[ix.0 as usize].clone();
        let resolved = ResolvedAnchor {
            x: self.resolve_metric(&anchor.x, context)?,
            y: self.resolve_metric(&anchor.y, context)?,
            contour_point: anchor.contour_point,
        };
        self.resolved_anchors.insert(ix, resolved.clone());
        Ok(resolved)
    }

    /// Build the variation store, if any value turned out to be variable.
    pub(crate) fn build_variation_store(
        &mut self,
    ) -> Option<(ItemVariationStore, VariationIndexRemapping)> {
        if self.store.is_empty() {
            return None;
        }
        let store = std::mem::take(&mut self.store);
        Some(store.build())
    }
}

/// A metric with its delta set assigned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct ResolvedMetric {
    pub value: i16,
    pub var: Option<DeltaSetId>,
}

/// A value record ready to be written.
///
/// Fields are in value record order: x placement, y placement, x advance,
/// y advance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct ResolvedValue {
    pub fields: [Option<ResolvedMetric>; 4],
}

impl ResolvedValue {
    pub fn format(&self) -> ValueFormat {
        let mut format = ValueFormat::empty();
        for (i, field) in self.fields.iter().enumerate() {
            if let Some(metric) = field {
                format |= ValueFormat::value_bit(i);
                if metric.var.is_some() {
                    format |= ValueFormat::device_bit(i);
                }
            }
        }
        format
    }

    pub fn var_ids(&self) -> impl Iterator<Item = DeltaSetId> + '_ {
        self.fields.iter().flatten().filter_map(|metric| metric.var)
    }

    /// Write this record with `format`, which must include our own format.
    ///
    /// Device offsets are relative to `base`.
    pub fn write(
        &self,
        writer: &mut TableWriter,
        format: ValueFormat,
        base: usize,
        devices: &DeviceOffsets,
    ) -> Result<(), Overflow> {
        for (i, field) in self.fields.iter().enumerate() {
            if format.contains(ValueFormat::value_bit(i)) {
                writer.write(&field.map(|metric| metric.value).unwrap_or(0));
            }
        }
        for (i, field) in self.fields.iter().enumerate() {
            if format.contains(ValueFormat::device_bit(i)) {
                let target = field
                    .and_then(|metric| metric.var)
                    .and_then(|id| devices.dev_offset(id));
                writer.offset16(base, target, "value record device offset")?;
            }
        }
        Ok(())
    }

    /// Write an all-zero record of `format`, for empty pair pos cells.
    pub fn write_empty(writer: &mut TableWriter, format: ValueFormat) {
        for _ in 0..format.bits().count_ones() {
            writer.write(&0u16);
        }
    }
}

/// An anchor ready to be written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct ResolvedAnchor {
    pub x: ResolvedMetric,
    pub y: ResolvedMetric,
    pub contour_point: Option<u16>,
}

impl ResolvedAnchor {
    pub fn format(&self) -> u16 {
        if self.x.var.is_some() || self.y.var.is_some() {
            3
        } else if self.contour_point.is_some() {
            2
        } else {
            1
        }
    }

    pub fn size(&self) -> usize {
        match self.format() {
            1 => 6,
            2 => 8,
            _ => 10,
        }
    }

    pub fn var_ids(&self) -> impl Iterator<Item = DeltaSetId> {
        self.x.var.into_iter().chain(self.y.var)
    }

    pub fn write(&self, writer: &mut TableWriter, devices: &DeviceOffsets) -> Result<(), Overflow> {
        let start = writer.position();
        let format = self.format();
        writer.write(&format);
        writer.write(&self.x.value);
        writer.write(&self.y.value);
        match format {
            1 => (),
            2 => writer.write(&self.contour_point.unwrap_or_default()),
            _ => {
                for var in [self.x.var, self.y.var] {
                    let target = var.and_then(|id| devices.dev_offset(id));
                    writer.offset16(start, target, "anchor device offset")?;
                }
            }
        }
        Ok(())
    }
}

/// Where a subtable placed the VariationIndex tables of its variable values.
///
/// A subtable only knows these positions once its own size is known, so
/// they are assigned just before its records are written.
#[derive(Clone, Debug, Default)]
pub struct DeviceOffsets {
    positions: HashMap<DeltaSetId, usize>,
    order: Vec<DeltaSetId>,
}

impl DeviceOffsets {
    /// The size of one VariationIndex table.
    pub const DEVICE_SIZE: usize = 6;

    /// Record that the table for `id` is written at absolute position `pos`.
    pub fn set_dev_offset(&mut self, id: DeltaSetId, pos: usize) {
        if self.positions.insert(id, pos).is_none() {
            self.order.push(id);
        }
    }

    /// The absolute position of the table for `id`, if one was placed.
    pub fn dev_offset(&self, id: DeltaSetId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Place one table per distinct id, contiguously from `start`.
    pub(crate) fn place(ids: impl IntoIterator<Item = DeltaSetId>, start: usize) -> Self {
        let mut devices = DeviceOffsets::default();
        for id in ids {
            if devices.dev_offset(id).is_none() {
                let pos = start + devices.order.len() * Self::DEVICE_SIZE;
                devices.set_dev_offset(id, pos);
            }
        }
        devices
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    /// Write the placed tables, in placement order.
    pub(crate) fn write_tables(&self, writer: &mut TableWriter, remap: &VariationIndexRemapping) {
        for id in &self.order {
            debug_assert_eq!(self.positions.get(id), Some(&writer.position()));
            let index = remap.get(*id).unwrap_or(VariationIndex {
                outer: 0xFFFF,
                inner: 0xFFFF,
            });
            writer.write(&index.outer);
            writer.write(&index.inner);
            // deltaFormat: VARIATION_INDEX
            writer.write(&0x8000u16);
        }
    }
}

/// Count the distinct ids in `ids`.
pub(crate) fn count_distinct(ids: impl IntoIterator<Item = DeltaSetId>) -> usize {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).count()
}
