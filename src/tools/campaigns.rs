use super::{Body, Field, Route, Source, ToolSpec, Verb};

const CAMPAIGN_ID: &[(Field, &str)] = &[(Field::Id, "Campaign ID is required")];
const CAMPAIGN_AND_ACCOUNT: &[(Field, &str)] = &[
    (Field::Id, "Campaign ID is required"),
    (Field::AccountId, "Account ID is required"),
];
const ASSIGNMENT: Body = Body::Fields {
    fields: &[("campaign_id", Source::Id), ("account_id", Source::AccountId)],
    merge_data: false,
};

pub static CAMPAIGNS: ToolSpec = ToolSpec {
    name: "manage_campaigns",
    description: "Create, update, start, stop, and delete campaigns. View campaign leads and activity. Manage campaign account assignments.",
    fields: &[
        (Field::Id, "Campaign ID (required for get/update/start/stop/delete/get_leads/get_activity)"),
        (Field::Data, "Request body for create/update actions"),
        (Field::AccountId, "Account ID for add_account/remove_account"),
        (Field::Limit, "Pagination limit"),
        (Field::Offset, "Pagination offset"),
        (Field::Search, "Search query"),
    ],
    routes: &[
        Route::new("list", Verb::Get, "/campaigns").query(&[
            ("limit", Field::Limit),
            ("offset", Field::Offset),
            ("search", Field::Search),
        ]),
        Route::new("get", Verb::Get, "/campaigns/{id}").require(CAMPAIGN_ID),
        Route::new("create", Verb::Post, "/campaigns").body(Body::Data),
        Route::new("update", Verb::Patch, "/campaigns")
            .require(CAMPAIGN_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id)],
                merge_data: true,
            }),
        Route::new("start", Verb::Patch, "/campaigns")
            .require(CAMPAIGN_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id), ("paused", Source::Flag(false))],
                merge_data: false,
            }),
        Route::new("stop", Verb::Patch, "/campaigns")
            .require(CAMPAIGN_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id), ("paused", Source::Flag(true))],
                merge_data: false,
            }),
        Route::new("delete", Verb::Post, "/campaigns/destroy")
            .require(CAMPAIGN_ID)
            .body(Body::Fields {
                fields: &[("id", Source::Id)],
                merge_data: false,
            }),
        Route::new("get_leads", Verb::Get, "/campaigns/{id}/leads")
            .require(CAMPAIGN_ID)
            .query(&[
                ("limit", Field::Limit),
                ("offset", Field::Offset),
                ("search", Field::Search),
            ]),
        Route::new("get_activity", Verb::Get, "/campaigns/{id}/activity")
            .require(CAMPAIGN_ID)
            .query(&[("limit", Field::Limit), ("offset", Field::Offset)]),
        Route::new("get_count", Verb::Get, "/campaigns/count"),
        Route::new("add_account", Verb::Post, "/campaigns/accounts")
            .require(CAMPAIGN_AND_ACCOUNT)
            .body(ASSIGNMENT),
        Route::new("remove_account", Verb::Delete, "/campaigns/accounts")
            .require(CAMPAIGN_AND_ACCOUNT)
            .body(ASSIGNMENT),
    ],
};
