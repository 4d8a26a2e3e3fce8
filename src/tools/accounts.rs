use super::{Body, Field, Route, Source, ToolSpec, Verb};

const ACCOUNT_ID: &[(Field, &str)] = &[(Field::Id, "Account ID is required")];
const PAGING: &[(&str, Field)] = &[("limit", Field::Limit), ("offset", Field::Offset)];

pub static ACCOUNTS: ToolSpec = ToolSpec {
    name: "manage_accounts",
    description: "Add, update, and delete Facebook accounts. View account stats and logs.",
    fields: &[
        (Field::Id, "Account ID (required for update/delete/get_stats/get_logs)"),
        (Field::Data, "Request body for add/update actions"),
        (Field::Limit, "Pagination limit"),
        (Field::Offset, "Pagination offset"),
    ],
    routes: &[
        Route::new("list", Verb::Get, "/accounts").query(PAGING),
        Route::new("add", Verb::Post, "/accounts").body(Body::Data),
        Route::new("update", Verb::Patch, "/accounts")
            .require(ACCOUNT_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id)],
                merge_data: true,
            }),
        Route::new("delete", Verb::Delete, "/accounts")
            .require(ACCOUNT_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id)],
                merge_data: false,
            }),
        Route::new("get_stats", Verb::Get, "/accounts/{id}/stats").require(ACCOUNT_ID),
        Route::new("get_logs", Verb::Get, "/accounts/{id}/logs")
            .require(ACCOUNT_ID)
            .query(PAGING),
    ],
};
