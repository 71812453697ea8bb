//! Branch copier: copy-on-write clone of an entire branch tree on branch
//! creation. Grounded on `examples/original_source/backend/create_branch.go`
//! (`copyBranchSheets` / `copySheetColumns` / `copyColumnData`).

use uuid::Uuid;

use crate::error::AppResult;
use crate::store::{NewColumn, NewSheet, Store};

/// Clone every sheet/column/cell of `source_branch` into `target_branch`,
/// stamping `source_sheet_id`/`source_column_id` provenance on each copied
/// sheet and column. Cells carry no provenance of their own (spec §4.3).
///
/// If `source_branch` has no sheets (a fresh project's first branch) this is
/// a no-op — the new branch is simply empty.
pub async fn copy_branch_tree(store: &dyn Store, source_branch: Uuid, target_branch: Uuid) -> AppResult<()> {
	store.copy_branch_contents(source_branch, target_branch).await
}

/// Reference implementation of the per-row copy steps a `Store::copy_branch_contents`
/// is expected to perform, used by `FakeStore` and documented here for
/// `PgStore` implementors: sheet-by-sheet, column-by-column, bulk cell
/// insert per column.
pub async fn copy_branch_contents_generic(store: &dyn Store, source_branch: Uuid, target_branch: Uuid) -> AppResult<()> {
	let source_sheets = store.list_sheets_for_branch(source_branch).await?;

	for sheet in source_sheets {
		let new_sheet = store
			.create_sheet(NewSheet {
				name: sheet.name.clone(),
				sheet_type: sheet.sheet_type,
				branch_id: target_branch,
				source_sheet_id: Some(sheet.id),
			})
			.await?;

		let columns = store.list_columns_for_sheet(sheet.id).await?;
		for column in columns {
			let new_column = store
				.create_column(NewColumn {
					name: column.name.clone(),
					column_type: column.column_type.clone(),
					required: column.required,
					sheet_id: new_sheet.id,
					source_column_id: Some(column.id),
					order_index: column.order_index,
				})
				.await?;

			let (_, cells) = store
				.get_columns_with_data_by_sheet(sheet.id)
				.await?
				.into_iter()
				.find(|(c, _)| c.id == column.id)
				.unwrap_or((column.clone(), Vec::new()));

			for cell in cells {
				store
					.add_column_data(new_column.id, cell.idx, cell.value.as_deref(), cell.cell_type.as_deref())
					.await?;
			}
		}
	}

	Ok(())
}
