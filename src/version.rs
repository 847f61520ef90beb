pub const VERSION: &str = match option_env!("V2LINK_BUILD_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
