use std::collections::HashMap;

use crate::models::{AggregatedEntry, ConsumptionEntry};

/// Identity used to group entries: the referenced food when there is one,
/// otherwise the entry's label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Food(i64),
    Label(String),
}

impl GroupKey {
    #[must_use]
    pub fn of(entry: &ConsumptionEntry) -> Self {
        match entry.food_id {
            Some(id) => Self::Food(id),
            None => Self::Label(entry.label.trim().to_string()),
        }
    }
}

/// Group one day's entries for display.
///
/// Groups are ordered by their most recent entry, newest first; groups with the
/// same `last_eaten_at` keep the order in which they first appeared in `entries`.
#[must_use]
pub fn aggregate_entries(entries: &[ConsumptionEntry]) -> Vec<AggregatedEntry> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<&ConsumptionEntry>> = Vec::new();

    for entry in entries {
        let slot = *index.entry(GroupKey::of(entry)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(entry);
    }

    let mut aggregated: Vec<AggregatedEntry> =
        groups.into_iter().filter_map(build_group).collect();
    // Stable sort keeps first-appearance order on ties.
    aggregated.sort_by(|a, b| b.last_eaten_at.cmp(&a.last_eaten_at));
    aggregated
}

fn build_group(mut members: Vec<&ConsumptionEntry>) -> Option<AggregatedEntry> {
    members.sort_by(|a, b| b.eaten_at.cmp(&a.eaten_at));

    let &first = members.first()?;
    let total_quantity_g: f64 = members.iter().map(|e| e.quantity_g).sum();
    let total_protein_g: f64 = members.iter().map(|e| e.protein_g).sum();
    let count = members.len();
    let name = first.label.trim().to_string();
    let display_text = display_text(count, first.quantity_g, &name);

    Some(AggregatedEntry {
        food_id: first.food_id,
        name,
        total_quantity_g,
        total_protein_g,
        count,
        last_eaten_at: first.eaten_at,
        entries: members.into_iter().cloned().collect(),
        display_text,
    })
}

/// `"50g Egg"` for a single entry, `"3x Egg"` for several.
#[must_use]
pub fn display_text(count: usize, quantity_g: f64, name: &str) -> String {
    if count == 1 {
        format!("{}g {name}", format_quantity(quantity_g))
    } else {
        format!("{count}x {name}")
    }
}

#[must_use]
pub fn format_quantity(quantity: f64) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0}")
    } else {
        format!("{quantity}")
    }
}
