use super::{Body, Field, Route, ToolSpec, Verb};

const CONVERSATION_ID: &[(Field, &str)] = &[(Field::Id, "Conversation ID is required")];
const PAGING: &[(&str, Field)] = &[("limit", Field::Limit), ("offset", Field::Offset)];

pub static INBOX: ToolSpec = ToolSpec {
    name: "manage_inbox",
    description: "View conversations, search messages, send replies, mark read/unread, and delete conversations.",
    fields: &[
        (Field::Id, "Conversation ID (required for get_messages/update)"),
        (Field::Data, "Request body for send_message/update/delete actions"),
        (Field::Query, "Search query for search action"),
        (Field::Limit, "Pagination limit"),
        (Field::Offset, "Pagination offset"),
    ],
    routes: &[
        Route::new("list", Verb::Get, "/inbox/conversations").query(PAGING),
        Route::new("search", Verb::Get, "/inbox/conversations/search")
            .require(&[(Field::Query, "Search query is required")])
            .query(&[
                ("q", Field::Query),
                ("limit", Field::Limit),
                ("offset", Field::Offset),
            ]),
        Route::new("get_messages", Verb::Get, "/inbox/conversations/{id}/messages")
            .require(CONVERSATION_ID)
            .query(PAGING),
        Route::new("send_message", Verb::Post, "/inbox/conversations/send").body(Body::Data),
        Route::new("update", Verb::Patch, "/inbox/conversations/{id}")
            .require(CONVERSATION_ID)
            .body(Body::Data),
        Route::new("delete", Verb::Delete, "/inbox/conversations").body(Body::Data),
        Route::new("get_unread_count", Verb::Get, "/inbox/conversations/unread-count"),
    ],
};
