use std::collections::{BTreeMap, BTreeSet};

use super::model::{Table, Value};

// ---------------------------------------------------------------------------
// Row selection: which values are accepted per column
// ---------------------------------------------------------------------------

/// Per-column selection: maps column_name → set of accepted values.
/// Values are compared by their join key, so `12741.0` selects `12741`.
pub type FilterState = BTreeMap<String, BTreeSet<Value>>;

/// Build a [`FilterState`] from `(column, value)` equality constraints.
pub fn equals<I, S>(constraints: I) -> FilterState
where
    I: IntoIterator<Item = (S, Value)>,
    S: Into<String>,
{
    let mut state = FilterState::new();
    for (col, val) in constraints {
        state
            .entry(col.into())
            .or_default()
            .extend(val.join_key());
    }
    state
}

/// Return indices of rows that pass all filters.
///
/// A row passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The row's value for that column is in the selected set → passes
/// * The table lacks the column → fails
pub fn filtered_indices(table: &Table, filters: &FilterState) -> Vec<usize> {
    let positions: Vec<(Option<usize>, &BTreeSet<Value>)> = filters
        .iter()
        .map(|(col, selected)| (table.column_index(col), selected))
        .collect();

    table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            positions.iter().all(|(idx, selected)| match idx {
                Some(i) => row[*i]
                    .join_key()
                    .is_some_and(|key| selected.contains(&key)),
                None => false,
            })
        })
        .map(|(i, _)| i)
        .collect()
}

// ---------------------------------------------------------------------------
// Unknown-value cleanup
// ---------------------------------------------------------------------------

/// Per-column sets of placeholder values that really mean "missing".
pub type NullRules = BTreeMap<String, BTreeSet<Value>>;

/// Replace every placeholder listed in `rules` with [`Value::Null`].
/// Columns absent from the table are ignored. Returns the number of cells
/// changed.
pub fn null_out(table: &mut Table, rules: &NullRules) -> usize {
    let mut changed = 0;
    for (col, placeholders) in rules {
        let Some(idx) = table.column_index(col) else {
            continue;
        };
        for row in &mut table.rows {
            if placeholders.contains(&row[idx]) {
                row[idx] = Value::Null;
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episodes() -> Table {
        Table {
            columns: vec!["SUBJECT_ID".into(), "EPISODE".into(), "ETHNICITY".into()],
            rows: vec![
                vec![Value::Integer(1), "episode1".into(), "WHITE".into()],
                vec![Value::Integer(1), "episode2".into(), "UNABLE TO OBTAIN".into()],
                vec![Value::Integer(2), "episode1".into(), "UNABLE TO OBTAIN".into()],
            ],
        }
    }

    #[test]
    fn filtered_indices_applies_every_constraint() {
        let filters = equals([
            ("SUBJECT_ID", Value::Float(1.0)),
            ("EPISODE", Value::from("episode2")),
        ]);
        assert_eq!(filtered_indices(&episodes(), &filters), vec![1]);
    }

    #[test]
    fn empty_selection_or_missing_column_hides_everything() {
        let mut filters = FilterState::new();
        filters.insert("EPISODE".into(), BTreeSet::new());
        assert!(filtered_indices(&episodes(), &filters).is_empty());

        let filters = equals([("HADM_ID", Value::Integer(1))]);
        assert!(filtered_indices(&episodes(), &filters).is_empty());

        assert_eq!(filtered_indices(&episodes(), &FilterState::new()).len(), 3);
    }

    #[test]
    fn null_out_replaces_placeholders() {
        let mut table = episodes();
        let mut rules = NullRules::new();
        rules.insert(
            "ETHNICITY".into(),
            BTreeSet::from([Value::from("UNABLE TO OBTAIN")]),
        );
        rules.insert("MARITAL_STATUS".into(), BTreeSet::from([Value::from("UNKNOWN (DEFAULT)")]));

        assert_eq!(null_out(&mut table, &rules), 2);
        assert_eq!(table.get(1, "ETHNICITY"), &Value::Null);
        assert_eq!(table.get(0, "ETHNICITY"), &Value::from("WHITE"));
    }
}
