pub mod daily_time;
pub mod name_search;
