pub mod waf_api;
