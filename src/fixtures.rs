//! Recorded provider documents and HTTP exchanges under `tests/fixtures/`.

use std::path::PathBuf;

fn path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// The fixture file `name`, as text.
pub(crate) fn text(name: &str) -> String {
    std::fs::read_to_string(path(name))
        .unwrap_or_else(|error| panic!("fixture {name}: {error}"))
}

/// The fixture file `name`, parsed as an HTTP/1.1 response.
pub(crate) fn response(name: &str) -> http::Response<String> {
    let raw = text(name);
    let (head, body) = raw.split_once("\n\n").unwrap_or((raw.as_str(), ""));
    let mut lines = head.lines();

    let status = lines
        .next()
        .and_then(|line| line.strip_prefix("HTTP/1.1 "))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|code| code.parse::<u16>().ok())
        .unwrap_or_else(|| panic!("fixture {name} has no HTTP/1.1 status line"));

    let mut builder = http::Response::builder().status(status);
    for line in lines {
        let (header, value) = line
            .split_once(':')
            .unwrap_or_else(|| panic!("fixture {name}: bad header line {line:?}"));
        builder = builder.header(header.trim(), value.trim());
    }

    builder
        .body(body.replace('\n', ""))
        .unwrap_or_else(|error| panic!("fixture {name}: {error}"))
}
