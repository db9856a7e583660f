pub mod debugbar;
