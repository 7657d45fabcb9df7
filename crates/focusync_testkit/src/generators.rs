//! Property-based test generators using proptest.
//!
//! Provides strategies for generating local collections and edit scripts
//! that keep record IDs unique.

use focusync_model::{FocusPreset, RecordId};
use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;
use std::collections::BTreeMap;

/// Strategy for generating record IDs.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}")
        .expect("Invalid regex")
        .prop_map(RecordId::new)
}

/// Strategy for generating display names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z ]{0,15}").expect("Invalid regex")
}

/// Strategy for generating guest presets within the valid field ranges.
pub fn preset_strategy() -> impl Strategy<Value = FocusPreset> {
    (
        record_id_strategy(),
        name_strategy(),
        1u32..=180,
        1u32..=30,
        -100i64..100,
    )
        .prop_map(|(id, name, focus, short, order)| {
            FocusPreset::new(name, focus, short)
                .with_id(id)
                .with_sort_order(order)
        })
}

/// Strategy for generating preset lists with unique IDs.
pub fn preset_list_strategy(max_len: usize) -> impl Strategy<Value = Vec<FocusPreset>> {
    prop::collection::vec(preset_strategy(), 0..=max_len).prop_map(|presets| {
        presets
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    })
}

/// One local edit.
#[derive(Debug, Clone)]
pub enum EditOp {
    /// Adds a preset, replacing any preset with the same ID.
    Add(FocusPreset),
    /// Removes the preset at `index % len`.
    Remove(usize),
    /// Renames the preset at `index % len`.
    Rename(usize, String),
}

/// Strategy for generating a single edit.
pub fn edit_op_strategy() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        preset_strategy().prop_map(EditOp::Add),
        any::<usize>().prop_map(EditOp::Remove),
        (any::<usize>(), name_strategy()).prop_map(|(i, name)| EditOp::Rename(i, name)),
    ]
}

/// Strategy for generating edit scripts.
pub fn edit_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<EditOp>> {
    prop::collection::vec(edit_op_strategy(), 1..=max_len)
}

/// Applies `op` to `presets`. Edits against an empty list are no-ops.
pub fn apply_edit(presets: &mut Vec<FocusPreset>, op: &EditOp) {
    match op {
        EditOp::Add(preset) => {
            presets.retain(|p| p.id != preset.id);
            presets.push(preset.clone());
        }
        EditOp::Remove(index) => {
            if !presets.is_empty() {
                let at = index % presets.len();
                presets.remove(at);
            }
        }
        EditOp::Rename(index, name) => {
            if !presets.is_empty() {
                let at = index % presets.len();
                presets[at].name = name.clone();
            }
        }
    }
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for engine-level tests, each of which
    /// spins up a runtime.
    #[must_use]
    pub fn engine() -> Self {
        Self {
            cases: 16,
            max_shrink_iters: 50,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
