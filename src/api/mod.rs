pub mod espn_api;
