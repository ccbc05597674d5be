#![no_main]

use libfuzzer_sys::fuzz_target;
use scantyx_live::{Endpoint, PageOrigin};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Split the input into an origin and a descriptor so both parsers see
    // arbitrary text.
    let (origin, raw) = s.split_once('\n').unwrap_or(("https://tickets.example", s));
    let origin = PageOrigin::parse(origin).ok();

    if let Some(endpoint) = Endpoint::new(raw) {
        if let Ok(url) = endpoint.resolve(origin.as_ref()) {
            assert!(matches!(url.scheme(), "ws" | "wss"));
            assert!(url.fragment().is_none());
            assert_eq!(endpoint.resolve(origin.as_ref()).ok(), Some(url));
        }
    }
});
