//! `DrawTable`: per-draw values keyed by `(draw id, grouping key)`.

use super::design::Design;
use super::{DrawError, DrawId, GroupingKey};
use ahash::AHashMap;
use ndarray::{Array2, ArrayView1, Axis};

/// A `draws × grouping keys` arena of per-draw values. `None` marks a cell whose
/// value is undefined for that draw (for example a PSE at a zero slope).
#[derive(Debug, Clone)]
pub struct DrawTable {
    model_id: String,
    design: Design,
    draw_ids: Vec<DrawId>,
    keys: Vec<GroupingKey>,
    draw_index: AHashMap<DrawId, usize>,
    key_index: AHashMap<GroupingKey, usize>,
    values: Array2<Option<f64>>,
}

impl DrawTable {
    pub fn new(
        model_id: impl Into<String>,
        design: Design,
        draw_ids: Vec<DrawId>,
        keys: Vec<GroupingKey>,
        values: Array2<Option<f64>>,
    ) -> Result<Self, DrawError> {
        if values.dim() != (draw_ids.len(), keys.len()) {
            return Err(DrawError::ShapeMismatch {
                rows: values.nrows(),
                cols: values.ncols(),
                draws: draw_ids.len(),
                terms: keys.len(),
            });
        }
        let mut draw_index = AHashMap::with_capacity(draw_ids.len());
        for (row, &id) in draw_ids.iter().enumerate() {
            if draw_index.insert(id, row).is_some() {
                return Err(DrawError::DuplicateDraw(id));
            }
        }
        let mut key_index = AHashMap::with_capacity(keys.len());
        for (col, key) in keys.iter().enumerate() {
            design.check_key(key)?;
            if key_index.insert(key.clone(), col).is_some() {
                return Err(DrawError::DuplicateKey(key.clone()));
            }
        }
        Ok(DrawTable {
            model_id: model_id.into(),
            design,
            draw_ids,
            keys,
            draw_index,
            key_index,
            values,
        })
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn design(&self) -> &Design {
        &self.design
    }

    pub fn draw_ids(&self) -> &[DrawId] {
        &self.draw_ids
    }

    pub fn keys(&self) -> &[GroupingKey] {
        &self.keys
    }

    pub fn values(&self) -> &Array2<Option<f64>> {
        &self.values
    }

    pub fn n_draws(&self) -> usize {
        self.draw_ids.len()
    }

    pub fn key_position(&self, key: &GroupingKey) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    /// The value of one cell. The outer `Option` is `None` for an unknown draw or
    /// key; the inner one for an undefined cell.
    pub fn get(&self, draw: DrawId, key: &GroupingKey) -> Option<Option<f64>> {
        let row = *self.draw_index.get(&draw)?;
        let col = *self.key_index.get(key)?;
        Some(self.values[[row, col]])
    }

    /// All draws of one grouping key, in draw order.
    pub fn column(&self, key: &GroupingKey) -> Option<ArrayView1<'_, Option<f64>>> {
        let col = self.key_position(key)?;
        Some(self.values.column(col))
    }

    /// The defined draws of one grouping key.
    pub fn defined_draws(&self, key: &GroupingKey) -> Vec<f64> {
        self.column(key)
            .map(|c| c.iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn undefined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Fails unless `other` comes from the same fit and covers exactly the same
    /// draws and grouping keys.
    pub fn check_aligned(&self, other: &DrawTable) -> Result<(), DrawError> {
        if self.model_id != other.model_id {
            return Err(DrawError::DrawAlignment(format!(
                "tables come from different fits ('{}' and '{}')",
                self.model_id, other.model_id
            )));
        }
        if self.draw_ids.len() != other.draw_ids.len() {
            return Err(DrawError::DrawAlignment(format!(
                "{} draws versus {} draws",
                self.draw_ids.len(),
                other.draw_ids.len()
            )));
        }
        if let Some(missing) = self
            .draw_ids
            .iter()
            .find(|id| !other.draw_index.contains_key(id))
        {
            return Err(DrawError::DrawAlignment(format!(
                "draw {missing} is missing from the other table"
            )));
        }
        if self.design != other.design || self.keys.len() != other.keys.len() {
            return Err(DrawError::DrawAlignment(
                "tables have different grouping designs".to_string(),
            ));
        }
        if let Some(missing) = self
            .keys
            .iter()
            .find(|k| !other.key_index.contains_key(*k))
        {
            return Err(DrawError::DrawAlignment(format!(
                "grouping key {missing} is missing from the other table"
            )));
        }
        Ok(())
    }

    /// Combines two aligned tables cell by cell, joining on `(draw id, key)`.
    /// Undefined inputs give undefined outputs; `f` may also return `None`.
    pub fn zip_with<F>(&self, other: &DrawTable, f: F) -> Result<DrawTable, DrawError>
    where
        F: Fn(DrawId, &GroupingKey, f64, f64) -> Option<f64>,
    {
        self.check_aligned(other)?;
        let col_map: Vec<usize> = self.keys.iter().map(|k| other.key_index[k]).collect();
        let mut values = Array2::from_elem(self.values.dim(), None);
        for (row, (&draw, mut out)) in self
            .draw_ids
            .iter()
            .zip(values.axis_iter_mut(Axis(0)))
            .enumerate()
        {
            let other_row = other.draw_index[&draw];
            for (col, key) in self.keys.iter().enumerate() {
                let a = self.values[[row, col]];
                let b = other.values[[other_row, col_map[col]]];
                out[col] = match (a, b) {
                    (Some(a), Some(b)) => f(draw, key, a, b),
                    _ => None,
                };
            }
        }
        Ok(self.with_values(values))
    }

    /// A table over the same draws and keys with new values.
    pub(crate) fn with_values(&self, values: Array2<Option<f64>>) -> DrawTable {
        DrawTable {
            model_id: self.model_id.clone(),
            design: self.design.clone(),
            draw_ids: self.draw_ids.clone(),
            keys: self.keys.clone(),
            draw_index: self.draw_index.clone(),
            key_index: self.key_index.clone(),
            values,
        }
    }

    /// Long-format rows `(draw, key, value)`, draws varying slowest.
    pub fn rows(&self) -> impl Iterator<Item = (DrawId, &GroupingKey, Option<f64>)> + '_ {
        self.draw_ids.iter().enumerate().flat_map(move |(row, &draw)| {
            self.keys
                .iter()
                .enumerate()
                .map(move |(col, key)| (draw, key, self.values[[row, col]]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posterior::design::Dimension;
    use ndarray::array;

    fn design() -> Design {
        Design::new(vec![Dimension::new("vis", &["HOPs", "intervals"])]).unwrap()
    }

    fn keys() -> Vec<GroupingKey> {
        design().keys()
    }

    fn table(model: &str, ids: &[u32], values: Array2<Option<f64>>) -> DrawTable {
        DrawTable::new(
            model,
            design(),
            ids.iter().map(|&i| DrawId(i)).collect(),
            keys(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn lookup_by_draw_and_key() {
        let t = table("m", &[7, 9], array![[Some(1.0), Some(2.0)], [None, Some(4.0)]]);
        let intervals = GroupingKey::new(["intervals"]);
        assert_eq!(t.get(DrawId(9), &intervals), Some(Some(4.0)));
        assert_eq!(t.get(DrawId(9), &GroupingKey::new(["HOPs"])), Some(None));
        assert_eq!(t.get(DrawId(8), &intervals), None);
        assert_eq!(t.defined_draws(&GroupingKey::new(["HOPs"])), vec![1.0]);
        assert_eq!(t.undefined_count(), 1);
        assert_eq!(t.rows().count(), 4);
    }

    #[test]
    fn zip_joins_by_draw_id_not_position() {
        let a = table("m", &[1, 2], array![[Some(1.0), Some(2.0)], [Some(3.0), Some(4.0)]]);
        let b = table("m", &[2, 1], array![[Some(30.0), Some(40.0)], [Some(10.0), Some(20.0)]]);
        let sum = a.zip_with(&b, |_, _, x, y| Some(x + y)).unwrap();
        assert_eq!(sum.get(DrawId(1), &GroupingKey::new(["HOPs"])), Some(Some(11.0)));
        assert_eq!(sum.get(DrawId(2), &GroupingKey::new(["intervals"])), Some(Some(44.0)));
    }

    #[test]
    fn misaligned_tables_fail() {
        let a = table("m", &[1, 2], Array2::from_elem((2, 2), Some(0.0)));
        let other_draws = table("m", &[1, 3], Array2::from_elem((2, 2), Some(0.0)));
        let fewer = table("m", &[1], Array2::from_elem((1, 2), Some(0.0)));
        let other_fit = table("n", &[1, 2], Array2::from_elem((2, 2), Some(0.0)));
        for b in [&other_draws, &fewer, &other_fit] {
            assert!(matches!(a.check_aligned(b), Err(DrawError::DrawAlignment(_))));
            assert!(a.zip_with(b, |_, _, x, _| Some(x)).is_err());
        }
    }

    #[test]
    fn construction_rejects_bad_keys_and_shapes() {
        let bad_key = DrawTable::new(
            "m",
            design(),
            vec![DrawId(1)],
            vec![GroupingKey::new(["QDPs"])],
            Array2::from_elem((1, 1), None),
        );
        assert!(matches!(bad_key, Err(DrawError::ForeignKey { .. })));
        let dup_key = DrawTable::new(
            "m",
            design(),
            vec![DrawId(1)],
            vec![GroupingKey::new(["HOPs"]), GroupingKey::new(["HOPs"])],
            Array2::from_elem((1, 2), None),
        );
        assert!(matches!(dup_key, Err(DrawError::DuplicateKey(_))));
        let shape = DrawTable::new("m", design(), vec![DrawId(1)], keys(), Array2::from_elem((2, 2), None));
        assert!(matches!(shape, Err(DrawError::ShapeMismatch { .. })));
    }
}
