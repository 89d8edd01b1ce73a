//! Dry-run planning.

use sync_core::{value_column_name, Catalog, Category};
use tracing::info;

/// What a sync run would do for one catalog table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub table: String,
    pub staging_table: String,
    pub value_column: String,
    pub category: Option<Category>,
}

/// List what a sync run would touch, without connecting to anything.
pub fn plan_incremental_sync(catalog: &Catalog) -> Vec<TablePlan> {
    let plans: Vec<TablePlan> = catalog
        .entries()
        .iter()
        .map(|entry| TablePlan {
            table: entry.table.clone(),
            staging_table: entry.staging_table(),
            value_column: value_column_name(&entry.table),
            category: entry.category,
        })
        .collect();

    for plan in &plans {
        info!(
            "[dry-run] {} -> {} (value column {}, category {})",
            plan.table,
            plan.staging_table,
            plan.value_column,
            plan.category.map_or("none", |c| c.as_str())
        );
    }
    plans
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::CatalogEntry;

    #[test]
    fn test_plan_lists_every_table() {
        let catalog = Catalog::new(vec![
            CatalogEntry {
                table: "SOMEPREFIX_ahur_temp".into(),
                category: Some(Category::Type1),
            },
            CatalogEntry {
                table: "site_data_2024".into(),
                category: None,
            },
        ]);
        let plans = plan_incremental_sync(&catalog);
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].staging_table, "someprefix_ahur_temp");
        assert_eq!(plans[0].value_column, "ahur_temp");
        assert_eq!(plans[1].value_column, "data_2024");
        assert_eq!(plans[1].category, None);
    }
}
