//! Document commands
//!
//! Create, read, list, update, status and delete handlers for every document
//! kind. The handlers are thin: argument shapes live here, behavior lives in
//! [`DocumentService`].

use crate::app::AppState;
use crate::database::{
    Document, DocumentStatus, Erha, ExpenseDocument, InvoiceDocument, ListFilter, Page, Paragon,
    PlanningDocument, QuotationDocument, TicketDocument,
};
use crate::error::Result;
use crate::services::DocumentService;
use serde::Deserialize;

/// Arguments naming one document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdArgs {
    pub id: String,
}

/// Arguments of a full update
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound = "I: serde::de::DeserializeOwned")]
pub struct UpdateArgs<I> {
    pub id: String,
    pub input: I,
}

/// Arguments of a status change
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusArgs {
    pub id: String,
    pub status: DocumentStatus,
}

async fn create<D: Document>(service: &DocumentService<D>, input: D::Input) -> Result<D> {
    service.create(input).await
}

async fn get<D: Document>(service: &DocumentService<D>, args: IdArgs) -> Result<D> {
    service.get(&args.id).await
}

async fn list<D: Document>(
    service: &DocumentService<D>,
    filter: ListFilter,
) -> Result<Page<D::Record>> {
    service.list(filter).await
}

async fn update<D: Document>(
    service: &DocumentService<D>,
    args: UpdateArgs<D::Input>,
) -> Result<D> {
    service.update(&args.id, args.input).await
}

async fn update_status<D: Document>(
    service: &DocumentService<D>,
    args: StatusArgs,
) -> Result<D> {
    service.update_status(&args.id, args.status).await
}

async fn delete<D: Document>(service: &DocumentService<D>, args: IdArgs) -> Result<()> {
    service.soft_delete(&args.id).await
}

/// Named handlers for one document kind
macro_rules! document_commands {
    (
        $field:ident: $doc:ty =>
        $create:ident, $get:ident, $list:ident, $update:ident, $status:ident, $delete:ident
    ) => {
        pub async fn $create(
            state: &AppState,
            input: <$doc as Document>::Input,
        ) -> Result<$doc> {
            create(&state.$field, input).await
        }

        pub async fn $get(state: &AppState, args: IdArgs) -> Result<$doc> {
            get(&state.$field, args).await
        }

        pub async fn $list(
            state: &AppState,
            filter: ListFilter,
        ) -> Result<Page<<$doc as Document>::Record>> {
            list(&state.$field, filter).await
        }

        pub async fn $update(
            state: &AppState,
            args: UpdateArgs<<$doc as Document>::Input>,
        ) -> Result<$doc> {
            update(&state.$field, args).await
        }

        pub async fn $status(state: &AppState, args: StatusArgs) -> Result<$doc> {
            update_status(&state.$field, args).await
        }

        pub async fn $delete(state: &AppState, args: IdArgs) -> Result<()> {
            delete(&state.$field, args).await
        }
    };
}

document_commands!(quotations: QuotationDocument =>
    create_quotation, get_quotation, list_quotations,
    update_quotation, update_quotation_status, delete_quotation);

document_commands!(invoices: InvoiceDocument =>
    create_invoice, get_invoice, list_invoices,
    update_invoice, update_invoice_status, delete_invoice);

document_commands!(paragon_tickets: TicketDocument<Paragon> =>
    create_paragon_ticket, get_paragon_ticket, list_paragon_tickets,
    update_paragon_ticket, update_paragon_ticket_status, delete_paragon_ticket);

document_commands!(erha_tickets: TicketDocument<Erha> =>
    create_erha_ticket, get_erha_ticket, list_erha_tickets,
    update_erha_ticket, update_erha_ticket_status, delete_erha_ticket);

document_commands!(plannings: PlanningDocument =>
    create_planning, get_planning, list_plannings,
    update_planning, update_planning_status, delete_planning);

document_commands!(expenses: ExpenseDocument =>
    create_expense, get_expense, list_expenses,
    update_expense, update_expense_status, delete_expense);
