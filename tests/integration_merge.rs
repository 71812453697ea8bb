//! End-to-end exercises of the six merge scenarios from spec.md §8,
//! driven against `FakeStore` so they run without a live Postgres instance.

#![cfg(feature = "integration-tests")]

use tabulon::domain::SheetType;
use tabulon::merge::{detect_conflicts, preview_and_execute, ChosenSource, MergeResolution};
use tabulon::store::{FakeStore, NewColumn, NewSheet, Store};
use uuid::Uuid;

/// A freshly created project with one `main` branch holding a `config`
/// (map-shaped) sheet: columns `key`(text)/`value`(text), rows
/// `("title","A")`, `("score","10")`.
struct Project {
	store: FakeStore,
	owner: Uuid,
	table_id: Uuid,
	main_branch: Uuid,
}

async fn setup() -> Project {
	let store = FakeStore::new();
	let owner = Uuid::new_v4();
	let project = store.create_project("demo", owner).await.unwrap();
	let main = store.create_branch("main", project.id, false).await.unwrap();

	let sheet = store
		.create_sheet(NewSheet {
			name: "config".to_string(),
			sheet_type: SheetType::Map,
			branch_id: main.id,
			source_sheet_id: None,
		})
		.await
		.unwrap();
	let key_col = store
		.create_column(NewColumn {
			name: "key".to_string(),
			column_type: "text".to_string(),
			required: false,
			sheet_id: sheet.id,
			source_column_id: None,
			order_index: 0,
		})
		.await
		.unwrap();
	let value_col = store
		.create_column(NewColumn {
			name: "value".to_string(),
			column_type: "text".to_string(),
			required: false,
			sheet_id: sheet.id,
			source_column_id: None,
			order_index: 1,
		})
		.await
		.unwrap();

	store.add_column_data(key_col.id, 0, Some("title"), None).await.unwrap();
	store.add_column_data(value_col.id, 0, Some("A"), None).await.unwrap();
	store.add_column_data(key_col.id, 1, Some("score"), None).await.unwrap();
	store.add_column_data(value_col.id, 1, Some("10"), None).await.unwrap();

	Project {
		store,
		owner,
		table_id: project.id,
		main_branch: main.id,
	}
}

/// Clone `main` into a branch named `name` via the copier's generic
/// reference implementation (the same path `FakeStore::copy_branch_contents`
/// delegates to).
async fn branch_from_main(p: &Project, name: &str) -> Uuid {
	let branch = p.store.create_branch(name, p.table_id, false).await.unwrap();
	tabulon::copier::copy_branch_tree(&p.store, p.main_branch, branch.id).await.unwrap();
	branch.id
}

/// Find the cell value of the `value` column at the row whose `key` column
/// holds `row_key`, within the named sheet of `branch_id`.
async fn read_value(store: &FakeStore, branch_id: Uuid, sheet_name: &str, row_key: &str) -> Option<String> {
	let sheets = store.list_sheets_for_branch(branch_id).await.unwrap();
	let sheet = sheets.into_iter().find(|s| s.name == sheet_name)?;
	let columns = store.list_columns_for_sheet(sheet.id).await.unwrap();
	let key_col = columns.iter().find(|c| c.name == "key")?;
	let value_col = columns.iter().find(|c| c.name == "value")?;

	let (_, key_cells) = store
		.get_columns_with_data_by_sheet(sheet.id)
		.await
		.unwrap()
		.into_iter()
		.find(|(c, _)| c.id == key_col.id)?;
	let idx = key_cells.iter().find(|c| c.value.as_deref() == Some(row_key))?.idx;

	let (_, value_cells) = store
		.get_columns_with_data_by_sheet(sheet.id)
		.await
		.unwrap()
		.into_iter()
		.find(|(c, _)| c.id == value_col.id)?;
	value_cells.iter().find(|c| c.idx == idx).and_then(|c| c.value.clone())
}

async fn set_value(store: &FakeStore, branch_id: Uuid, sheet_name: &str, row_key: &str, new_value: &str) {
	let sheets = store.list_sheets_for_branch(branch_id).await.unwrap();
	let sheet = sheets.into_iter().find(|s| s.name == sheet_name).unwrap();
	let columns = store.list_columns_for_sheet(sheet.id).await.unwrap();
	let key_col = columns.iter().find(|c| c.name == "key").unwrap();
	let value_col = columns.iter().find(|c| c.name == "value").unwrap();

	let (_, key_cells) = store
		.get_columns_with_data_by_sheet(sheet.id)
		.await
		.unwrap()
		.into_iter()
		.find(|(c, _)| c.id == key_col.id)
		.unwrap();
	let idx = key_cells.iter().find(|c| c.value.as_deref() == Some(row_key)).unwrap().idx;

	let (_, value_cells) = store
		.get_columns_with_data_by_sheet(sheet.id)
		.await
		.unwrap()
		.into_iter()
		.find(|(c, _)| c.id == value_col.id)
		.unwrap();
	let cell = value_cells.iter().find(|c| c.idx == idx).unwrap();
	store.update_column_data(cell.id, Some(new_value), None).await.unwrap();
}

#[tokio::test]
async fn scenario_1_clean_copy_then_noop_merge() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert!(conflicts.is_empty());

	preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await.unwrap();

	assert!(p.store.get_branch(feature).await.unwrap().is_none());
	assert_eq!(read_value(&p.store, p.main_branch, "config", "title").await.as_deref(), Some("A"));
	assert_eq!(read_value(&p.store, p.main_branch, "config", "score").await.as_deref(), Some("10"));
}

#[tokio::test]
async fn scenario_2_cell_conflict_pick_source() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	set_value(&p.store, p.main_branch, "config", "title", "A-prime").await;
	set_value(&p.store, feature, "config", "title", "A-double-prime").await;

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert_eq!(conflicts.len(), 1);
	assert_eq!(conflicts[0].source_value, "A-double-prime");
	assert_eq!(conflicts[0].target_value, "A-prime");

	let resolutions = vec![MergeResolution {
		conflict_id: conflicts[0].id.clone(),
		chosen_source: ChosenSource::Source,
	}];
	preview_and_execute(&p.store, feature, p.main_branch, divergence, resolutions).await.unwrap();

	assert_eq!(
		read_value(&p.store, p.main_branch, "config", "title").await.as_deref(),
		Some("A-double-prime")
	);
}

#[tokio::test]
async fn scenario_3_cell_conflict_pick_target() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	set_value(&p.store, p.main_branch, "config", "title", "A-prime").await;
	set_value(&p.store, feature, "config", "title", "A-double-prime").await;

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert_eq!(conflicts.len(), 1);

	let resolutions = vec![MergeResolution {
		conflict_id: conflicts[0].id.clone(),
		chosen_source: ChosenSource::Target,
	}];
	preview_and_execute(&p.store, feature, p.main_branch, divergence, resolutions).await.unwrap();

	assert_eq!(read_value(&p.store, p.main_branch, "config", "title").await.as_deref(), Some("A-prime"));
}

#[tokio::test]
async fn scenario_4_non_conflicting_cell_edit_propagates() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	set_value(&p.store, feature, "config", "score", "20").await;

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert!(conflicts.is_empty());

	preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await.unwrap();

	assert_eq!(read_value(&p.store, p.main_branch, "config", "score").await.as_deref(), Some("20"));
}

#[tokio::test]
async fn scenario_5_new_column_propagates_with_data() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	let feature_sheets = p.store.list_sheets_for_branch(feature).await.unwrap();
	let feature_sheet = feature_sheets.into_iter().find(|s| s.name == "config").unwrap();
	let locale_col = p
		.store
		.create_column(NewColumn {
			name: "locale".to_string(),
			column_type: "text".to_string(),
			required: false,
			sheet_id: feature_sheet.id,
			source_column_id: None,
			order_index: 2,
		})
		.await
		.unwrap();
	p.store.add_column_data(locale_col.id, 0, Some("en"), None).await.unwrap();
	p.store.add_column_data(locale_col.id, 1, Some("de"), None).await.unwrap();

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert!(conflicts.is_empty());

	preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await.unwrap();

	let main_sheets = p.store.list_sheets_for_branch(p.main_branch).await.unwrap();
	let main_sheet = main_sheets.into_iter().find(|s| s.name == "config").unwrap();
	let main_columns = p.store.list_columns_for_sheet(main_sheet.id).await.unwrap();
	let new_col = main_columns.iter().find(|c| c.name == "locale").expect("locale column propagated to main");
	assert_eq!(new_col.source_column_id, Some(locale_col.id));

	let (_, cells) = p
		.store
		.get_columns_with_data_by_sheet(main_sheet.id)
		.await
		.unwrap()
		.into_iter()
		.find(|(c, _)| c.id == new_col.id)
		.unwrap();
	let mut values: Vec<Option<String>> = cells.iter().map(|c| c.value.clone()).collect();
	values.sort();
	assert_eq!(values, vec![Some("de".to_string()), Some("en".to_string())]);

	// Columns created by this merge must survive the deletion-propagation
	// phase that runs immediately afterward in the same pipeline.
	let main_columns_after = p.store.list_columns_for_sheet(main_sheet.id).await.unwrap();
	assert!(main_columns_after.iter().any(|c| c.name == "locale"));
}

#[tokio::test]
async fn scenario_6_column_deletion_propagates() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	let feature_sheets = p.store.list_sheets_for_branch(feature).await.unwrap();
	let feature_sheet = feature_sheets.into_iter().find(|s| s.name == "config").unwrap();
	let feature_columns = p.store.list_columns_for_sheet(feature_sheet.id).await.unwrap();
	p.store.delete_column(feature_columns.iter().find(|c| c.name == "key").unwrap().id).await.unwrap();

	let source_rows = p.store.get_branch_data_for_merge(feature).await.unwrap();
	let target_rows = p.store.get_branch_data_for_merge(p.main_branch).await.unwrap();
	let conflicts = detect_conflicts(&source_rows, &target_rows, divergence);
	assert!(conflicts.is_empty());

	preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await.unwrap();

	let main_sheets = p.store.list_sheets_for_branch(p.main_branch).await.unwrap();
	let main_sheet = main_sheets.into_iter().find(|s| s.name == "config").unwrap();
	let main_columns = p.store.list_columns_for_sheet(main_sheet.id).await.unwrap();
	assert!(main_columns.iter().all(|c| c.name != "key"), "key column should have been deleted by merge");
	assert!(main_columns.iter().any(|c| c.name == "value"), "value column should survive");
}

#[tokio::test]
async fn merge_rejects_mismatched_resolution_count() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	set_value(&p.store, p.main_branch, "config", "title", "A-prime").await;
	set_value(&p.store, feature, "config", "title", "A-double-prime").await;

	let result = preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await;
	assert!(result.is_err());

	// The source branch must still exist: a failed execute does not retire it.
	assert!(p.store.get_branch(feature).await.unwrap().is_some());
}

#[tokio::test]
async fn source_branch_unresolvable_after_successful_merge() {
	let p = setup().await;
	let feature = branch_from_main(&p, "feature").await;
	let divergence = p.store.get_branch(feature).await.unwrap().unwrap().created_at;

	preview_and_execute(&p.store, feature, p.main_branch, divergence, vec![]).await.unwrap();

	assert!(p.store.get_branch(feature).await.unwrap().is_none());
}
