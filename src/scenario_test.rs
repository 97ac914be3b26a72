#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::fixture::FixtureRow;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plan_from_default_fixture() {
        let plan = SupplierPlan::from_dataset(&FixtureDataset::gst_default(), "Supplier A");
        assert_eq!(
            plan,
            SupplierPlan {
                expected_rows: 3,
                supplier: "Supplier A".to_string(),
                expected_dropdowns: 2,
                assignee: "Admin".to_string(),
                unassigned: "None".to_string(),
            }
        );
    }

    #[test]
    fn test_plan_collapses_duplicate_pairs() {
        let row = |supplier: &str, kind: &str| {
            FixtureRow::new()
                .with("Supplier Name", supplier)
                .with("Type", kind)
        };
        let dataset = FixtureDataset::new(vec![
            row("Supplier A", "Missing_2B_Cumulative"),
            row("Supplier A", "Missing_2B_Cumulative"),
            row("Supplier A", "Missing_in_PR_Cumulative"),
        ]);

        let plan = SupplierPlan::from_dataset(&dataset, "Supplier A");
        assert_eq!(plan.expected_rows, 2);
        assert_eq!(plan.expected_dropdowns, 2);
    }

    #[test]
    fn test_dropdown_query() {
        let plan = SupplierPlan::from_dataset(&FixtureDataset::gst_default(), "Supplier A");
        assert_eq!(
            plan.dropdowns().nth(1).to_string(),
            "tr:has-text(\"Supplier A\") >> .add-to-select >> nth=1"
        );
    }

    #[test]
    fn test_stages_are_ordered() {
        let mut sorted = Stage::ALL;
        sorted.sort();
        assert_eq!(sorted, Stage::ALL);
        assert_eq!(Stage::ProcessingDone.to_string(), "processing-done");
    }

    #[test]
    fn test_tracker_records_in_order() {
        let mut tracker = StageTracker::new();
        tracker.reached(Stage::Idle);
        tracker.reached(Stage::Uploading);

        let records = tracker.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stage, "idle");
        assert_eq!(records[1].stage, "uploading");
        assert!(records[0].reached_after_ms <= records[1].reached_after_ms);
    }
}
