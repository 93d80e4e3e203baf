//! Raw HTTP edge cases of the fake launcher.
#![cfg(unix)]

use std::{
    io::{Read, Write},
    net::TcpStream,
    time::Duration,
};

use es_fixture::*;

mod common;
use common::*;

fn send(exec: &ProcessExecutor, raw: &str) -> String {
    let mut stream = TcpStream::connect((exec.host(), exec.port())).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).unwrap();
    reply
}

#[test]
fn malformed_requests_get_bad_request() -> FixtureResult<()> {
    let mut srv = stub_server(&[], Duration::from_secs(20))?;
    srv.executor.start()?;
    let exec = &srv.executor;

    let reply = send(
        exec,
        "PUT /books/_doc/1 HTTP/1.1\r\nHost: x\r\nContent-Length: abc\r\n\r\n",
    );
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request"), "{reply}");
    assert!(reply.contains("invalid Content-Length `abc`"), "{reply}");

    let reply = send(
        exec,
        "PUT /books/_doc/1 HTTP/1.1\r\nContent-Length: -3\r\n\r\n",
    );
    assert!(reply.starts_with("HTTP/1.1 400"), "{reply}");

    let reply = send(exec, "GARBAGE\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 400"), "{reply}");
    assert!(reply.contains("malformed request line"), "{reply}");

    // None of the rejected writes may have created the index.
    let client = SearchClient::new(exec.host(), exec.port(), Duration::from_secs(5));
    assert!(client.indices()?.is_empty());
    Ok(())
}

#[test]
fn well_formed_body_is_stored() -> FixtureResult<()> {
    let mut srv = stub_server(&[], Duration::from_secs(20))?;
    srv.executor.start()?;
    let exec = &srv.executor;

    let body = r#"{"title":"Dune"}"#;
    let reply = send(
        exec,
        &format!(
            "PUT /books/_doc/1 HTTP/1.1\r\nContent-Type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        ),
    );
    assert!(reply.starts_with("HTTP/1.1 201 Created"), "{reply}");

    let reply = send(exec, "GET /books/_doc/1 HTTP/1.1\r\n\r\n");
    assert!(reply.starts_with("HTTP/1.1 200 OK"), "{reply}");
    assert!(reply.contains(r#""_source":{"title":"Dune"}"#), "{reply}");
    Ok(())
}
