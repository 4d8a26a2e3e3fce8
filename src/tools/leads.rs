use super::{Body, Field, Route, ToolSpec, Verb};

const COLLECTION_ID: &[(Field, &str)] = &[(Field::Id, "Collection ID is required")];
const SEARCH_PAGING: &[(&str, Field)] = &[
    ("limit", Field::Limit),
    ("offset", Field::Offset),
    ("search", Field::Search),
];

pub static LEADS: ToolSpec = ToolSpec {
    name: "manage_leads",
    description: "Manage lead collections — import CSV, scrape groups/pages, merge, rename, delete, export. Browse individual leads within a collection.",
    fields: &[
        (Field::Id, "Collection ID (required for get_collection/rename/delete/get_leads/export/rescrape/retry)"),
        (Field::Data, "Request body for import/scrape/merge/rename actions"),
        (Field::Limit, "Pagination limit"),
        (Field::Offset, "Pagination offset"),
        (Field::Search, "Search query"),
    ],
    routes: &[
        Route::new("list_collections", Verb::Get, "/leads").query(SEARCH_PAGING),
        Route::new("get_collection", Verb::Get, "/leads/{id}").require(COLLECTION_ID),
        Route::new("import", Verb::Post, "/leads/import").body(Body::Data),
        Route::new("scrape_group", Verb::Post, "/leads/groups").body(Body::Data),
        Route::new("scrape_pages", Verb::Post, "/leads/pages").body(Body::Data),
        Route::new("merge", Verb::Post, "/leads/merge").body(Body::Data),
        Route::new("rename", Verb::Patch, "/leads/{id}")
            .require(COLLECTION_ID)
            .body(Body::Data),
        Route::new("delete", Verb::Delete, "/leads/{id}").require(COLLECTION_ID),
        Route::new("get_leads", Verb::Get, "/leads/{id}/leads")
            .require(COLLECTION_ID)
            .query(SEARCH_PAGING),
        Route::new("export", Verb::Get, "/leads/{id}/export").require(COLLECTION_ID),
        Route::new("rescrape", Verb::Post, "/leads/{id}/rescrape").require(COLLECTION_ID),
        Route::new("retry", Verb::Post, "/leads/{id}/retry").require(COLLECTION_ID),
    ],
};
