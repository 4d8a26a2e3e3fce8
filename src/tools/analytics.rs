use super::{Field, Route, ToolSpec, Verb};

const PERIOD: &[(&str, Field)] = &[("period", Field::Period)];

pub static ANALYTICS: ToolSpec = ToolSpec {
    name: "get_analytics",
    description: "Get dashboard stats, activity charts, performance metrics, and message/booking charts.",
    fields: &[(Field::Period, "Time period filter (e.g. \"7d\", \"30d\")")],
    routes: &[
        Route::new("dashboard_stats", Verb::Get, "/dashboard/stats").query(PERIOD),
        Route::new("activity_chart", Verb::Get, "/dashboard/activity").query(PERIOD),
        Route::new("performance", Verb::Get, "/dashboard/performance").query(PERIOD),
        Route::new("messages_chart", Verb::Get, "/charts/messages").query(PERIOD),
        Route::new("bookings_chart", Verb::Get, "/charts/bookings").query(PERIOD),
    ],
};
