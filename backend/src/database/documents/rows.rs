//! Column bindings for the child row types

use crate::database::models::{ExpenseItem, ItemDetail, LineItem, PlanningItem, Remark, Signature};
use crate::database::reconcile::{ChildRow, NoDetail, OrderedRow};
use sqlx::query_builder::Separated;
use sqlx::Sqlite;

/// Implements the id/order accessors shared by every child row type
macro_rules! ordered_row_accessors {
    () => {
        fn id(&self) -> Option<&str> {
            self.id.as_deref()
        }

        fn set_id(&mut self, id: Option<String>) {
            self.id = id;
        }

        fn order(&self) -> i64 {
            self.order
        }

        fn set_order(&mut self, order: i64) {
            self.order = order;
        }
    };
}

impl OrderedRow for LineItem {
    const COLUMNS: &'static [&'static str] = &[
        "product_name",
        "description",
        "quantity",
        "unit",
        "unit_price",
        "amount",
    ];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.product_name.clone())
            .push_bind(self.description.clone())
            .push_bind(self.quantity)
            .push_bind(self.unit.clone())
            .push_bind(self.unit_price)
            .push_bind(self.amount);
    }
}

impl ChildRow for LineItem {
    type Detail = ItemDetail;

    fn details(&self) -> &[ItemDetail] {
        &self.details
    }

    fn set_details(&mut self, details: Vec<ItemDetail>) {
        self.details = details;
    }
}

impl OrderedRow for ItemDetail {
    const COLUMNS: &'static [&'static str] =
        &["description", "quantity", "unit", "unit_price", "amount"];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.description.clone())
            .push_bind(self.quantity)
            .push_bind(self.unit.clone())
            .push_bind(self.unit_price)
            .push_bind(self.amount);
    }
}

impl OrderedRow for Remark {
    const COLUMNS: &'static [&'static str] = &["text", "is_completed"];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.text.clone())
            .push_bind(self.is_completed);
    }
}

impl ChildRow for Remark {
    type Detail = NoDetail;
}

impl OrderedRow for Signature {
    const COLUMNS: &'static [&'static str] = &["name", "position", "image_data"];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.name.clone())
            .push_bind(self.position.clone())
            .push_bind(self.image_data.clone());
    }
}

impl ChildRow for Signature {
    type Detail = NoDetail;
}

impl OrderedRow for PlanningItem {
    const COLUMNS: &'static [&'static str] = &["activity", "scheduled_date", "location", "is_done"];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.activity.clone())
            .push_bind(self.scheduled_date)
            .push_bind(self.location.clone())
            .push_bind(self.is_done);
    }
}

impl ChildRow for PlanningItem {
    type Detail = NoDetail;
}

impl OrderedRow for ExpenseItem {
    const COLUMNS: &'static [&'static str] = &["description", "quantity", "unit_price", "amount"];

    ordered_row_accessors!();

    fn push_values<'args>(&self, values: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        values
            .push_bind(self.description.clone())
            .push_bind(self.quantity)
            .push_bind(self.unit_price)
            .push_bind(self.amount);
    }
}

impl ChildRow for ExpenseItem {
    type Detail = NoDetail;
}
