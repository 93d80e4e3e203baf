//! Es Fixture Stub: a fake `elasticsearch` launcher
//! ================================================
//!
//! Accepts the same command line the fixtures build (`-Vv`, `-p <pidfile>`,
//! `-E key=value`) and answers a small in-memory subset of the REST API, so
//! the fixture lifecycle can be tested on machines without a JVM.
//!
//! Behaviour is steered through the environment, which the fixtures forward
//! via `LaunchConfig::env`:
//!
//! | Variable                          | Effect                                             |
//! |-----------------------------------|----------------------------------------------------|
//! | `ES_FIXTURE_STUB_VERSION`         | version in the `-Vv` banner and `GET /` (`7.9.0`) |
//! | `ES_FIXTURE_STUB_MODE`            | `serve`, `never-bind`, `exit-now`, `exit-after=MS` |
//! | `ES_FIXTURE_STUB_STARTUP_DELAY_MS`| sleep before binding the HTTP port                 |
//!
//! ```text
//! $ ES_FIXTURE_STUB_VERSION=6.8.0 es-fixture-stub -Vv
//! Version: 6.8.0, Build: default/tar/stub/2020-08-11T21:36:48.204330Z, JVM: 14.0.1
//! ```

use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use clap::{ArgAction, Parser};
use serde_json::{json, Value};

const VERSION_VAR: &str = "ES_FIXTURE_STUB_VERSION";
const MODE_VAR: &str = "ES_FIXTURE_STUB_MODE";
const DELAY_VAR: &str = "ES_FIXTURE_STUB_STARTUP_DELAY_MS";
const DEFAULT_VERSION: &str = "7.9.0";

#[derive(Debug, Parser)]
#[command(name = "es-fixture-stub")]
struct Cli {
    /// Print the version banner and exit (`-Vv`)
    #[arg(short = 'V', action = ArgAction::SetTrue)]
    show_version: bool,

    /// Second half of `-Vv`; ignored
    #[arg(short = 'v', action = ArgAction::Count)]
    _verbose: u8,

    /// Write our pid here
    #[arg(short = 'p', value_name = "PIDFILE")]
    pidfile: Option<PathBuf>,

    /// Settings, `-E key=value`
    #[arg(short = 'E', value_name = "KEY=VALUE", value_parser = parse_setting)]
    settings: Vec<(String, String)>,
}

fn parse_setting(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    Serve,
    NeverBind,
    ExitNow,
    ExitAfter(Duration),
}

impl Mode {
    fn from_env() -> Result<Self, String> {
        let raw = std::env::var(MODE_VAR).unwrap_or_default();
        match raw.as_str() {
            "" | "serve" => Ok(Mode::Serve),
            "never-bind" => Ok(Mode::NeverBind),
            "exit-now" => Ok(Mode::ExitNow),
            other => other
                .strip_prefix("exit-after=")
                .and_then(|ms| ms.parse::<u64>().ok())
                .map(|ms| Mode::ExitAfter(Duration::from_millis(ms)))
                .ok_or_else(|| format!("unknown {MODE_VAR} `{other}`")),
        }
    }
}

/// index -> id -> source
type Store = Arc<Mutex<BTreeMap<String, BTreeMap<String, Value>>>>;

#[derive(Debug, Clone)]
struct Node {
    version: String,
    cluster_name: String,
    store: Store,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("es-fixture-stub: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let version = std::env::var(VERSION_VAR).unwrap_or_else(|_| DEFAULT_VERSION.to_string());

    if cli.show_version {
        println!("OpenJDK 64-Bit Server VM warning: stub JVM, nothing to see here");
        println!(
            "Version: {version}, Build: default/tar/stub/2020-08-11T21:36:48.204330Z, JVM: 14.0.1"
        );
        return Ok(());
    }

    let mode = Mode::from_env()?;
    let settings: BTreeMap<String, String> = cli.settings.into_iter().collect();
    println!("es-fixture-stub {version} started with {settings:?}");

    if let Some(pidfile) = &cli.pidfile {
        std::fs::write(pidfile, std::process::id().to_string())
            .map_err(|e| format!("cannot write {}: {e}", pidfile.display()))?;
    }
    for key in ["path.logs", "path.data"] {
        if let Some(dir) = settings.get(key) {
            std::fs::create_dir_all(dir).map_err(|e| format!("cannot create {dir}: {e}"))?;
        }
    }

    match mode {
        Mode::ExitNow => {
            println!("exiting as requested");
            std::process::exit(2);
        }
        Mode::NeverBind => loop {
            thread::sleep(Duration::from_secs(3600));
        },
        Mode::ExitAfter(after) => {
            thread::spawn(move || {
                thread::sleep(after);
                println!("exiting after {after:?} as requested");
                std::process::exit(3);
            });
        }
        Mode::Serve => (),
    }

    if let Some(delay) = std::env::var(DELAY_VAR)
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
    {
        thread::sleep(Duration::from_millis(delay));
    }

    let host = settings
        .get("network.host")
        .cloned()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = settings
        .get("http.port")
        .ok_or("missing -E http.port")?
        .parse::<u16>()
        .map_err(|e| format!("bad http.port: {e}"))?;
    let node = Node {
        version,
        cluster_name: settings
            .get("cluster.name")
            .cloned()
            .unwrap_or_else(|| "elasticsearch".to_string()),
        store: Store::default(),
    };

    let listener =
        TcpListener::bind((host.as_str(), port)).map_err(|e| format!("bind {host}:{port}: {e}"))?;
    println!("listening on {host}:{port}");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let node = node.clone();
                thread::spawn(move || {
                    if let Err(e) = serve_connection(stream, &node) {
                        eprintln!("connection error: {e}");
                    }
                });
            }
            Err(e) => eprintln!("accept failed: {e}"),
        }
    }
    Ok(())
}

/// Largest request body the stub will buffer.
const MAX_BODY: usize = 16 << 20;

#[derive(Debug)]
struct Request {
    method: String,
    target: String,
    body: Vec<u8>,
}

fn serve_connection(stream: TcpStream, node: &Node) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let (status, reply) = match read_request(&mut reader)? {
        Ok(request) => {
            let path = request.target.split('?').next().unwrap_or("/");
            route(node, &request.method, path, &request.body)
        }
        Err(reason) => error(400, "bad_request", reason),
    };
    let payload = reply.to_string();
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        reason(status),
        payload.len()
    )?;
    stream.flush()
}

/// Read one request. The outer error means the connection broke, the inner
/// one that the request is malformed and deserves a 400. Headers are always
/// consumed up to the blank line, so the 400 reaches the client.
fn read_request(reader: &mut impl BufRead) -> std::io::Result<Result<Request, String>> {
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let (mut problem, method, target) = match parts.as_slice() {
        [method, target, version] if target.starts_with('/') && version.starts_with("HTTP/") => {
            (None, method.to_string(), target.to_string())
        }
        _ => (
            Some(format!("malformed request line `{}`", request_line.trim_end())),
            String::new(),
            String::new(),
        ),
    };

    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            problem.get_or_insert_with(|| format!("malformed header `{}`", line.trim_end()));
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            match value.trim().parse::<usize>() {
                Ok(len) if len <= MAX_BODY => content_length = len,
                Ok(len) => {
                    problem.get_or_insert_with(|| format!("body of {len} bytes is too large"));
                }
                Err(_) => {
                    problem.get_or_insert_with(|| {
                        format!("invalid Content-Length `{}`", value.trim())
                    });
                }
            }
        }
    }
    if let Some(problem) = problem {
        return Ok(Err(problem));
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;
    Ok(Ok(Request {
        method,
        target,
        body,
    }))
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

fn error(status: u16, kind: &str, reason: String) -> (u16, Value) {
    (
        status,
        json!({"error": {"type": kind, "reason": reason}, "status": status}),
    )
}

fn route(node: &Node, method: &str, path: &str, body: &[u8]) -> (u16, Value) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Ok(mut store) = node.store.lock() else {
        return error(500, "internal", "store poisoned".to_string());
    };
    let source = || serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);

    match (method, segments.as_slice()) {
        ("GET", []) => (
            200,
            json!({
                "name": "stub-node",
                "cluster_name": node.cluster_name,
                "cluster_uuid": "stub",
                "version": {"number": node.version, "lucene_version": "8.6.0"},
                "tagline": "You Know, for Search"
            }),
        ),
        ("GET", ["_cluster", "health"]) => (
            200,
            json!({
                "cluster_name": node.cluster_name,
                "status": "green",
                "timed_out": false,
                "number_of_nodes": 1,
                "active_shards": store.len()
            }),
        ),
        ("GET", ["_alias"]) => {
            let aliases: serde_json::Map<String, Value> = store
                .keys()
                .map(|index| (index.clone(), json!({"aliases": {}})))
                .collect();
            (200, Value::Object(aliases))
        }
        ("PUT", [index]) => {
            if store.contains_key(*index) {
                return error(
                    400,
                    "resource_already_exists_exception",
                    format!("index [{index}] already exists"),
                );
            }
            store.insert(index.to_string(), BTreeMap::new());
            (200, json!({"acknowledged": true, "index": index}))
        }
        ("DELETE", [index]) => match store.remove(*index) {
            Some(_) => (200, json!({"acknowledged": true})),
            None => error(404, "index_not_found_exception", format!("no such index [{index}]")),
        },
        ("PUT", [index, "_doc", id]) => {
            let docs = store.entry(index.to_string()).or_default();
            let result = match docs.insert(id.to_string(), source()) {
                Some(_) => "updated",
                None => "created",
            };
            (
                if result == "created" { 201 } else { 200 },
                json!({"_index": index, "_id": id, "_version": 1, "result": result}),
            )
        }
        ("POST", [index, "_doc"]) => {
            let docs = store.entry(index.to_string()).or_default();
            let id = format!("stub-{}", docs.len() + 1);
            docs.insert(id.clone(), source());
            (
                201,
                json!({"_index": index, "_id": id, "_version": 1, "result": "created"}),
            )
        }
        ("GET", [index, "_doc", id]) => match store.get(*index) {
            None => error(404, "index_not_found_exception", format!("no such index [{index}]")),
            Some(docs) => match docs.get(*id) {
                Some(doc) => (
                    200,
                    json!({"_index": index, "_id": id, "found": true, "_source": doc}),
                ),
                None => (404, json!({"_index": index, "_id": id, "found": false})),
            },
        },
        ("POST", [index, "_refresh"]) => match store.contains_key(*index) {
            true => (200, json!({"_shards": {"total": 1, "successful": 1, "failed": 0}})),
            false => error(404, "index_not_found_exception", format!("no such index [{index}]")),
        },
        ("GET" | "POST", [index, "_search"]) => match store.get(*index) {
            None => error(404, "index_not_found_exception", format!("no such index [{index}]")),
            Some(docs) => {
                let hits: Vec<Value> = docs
                    .iter()
                    .map(|(id, doc)| {
                        json!({"_index": index, "_id": id, "_score": 1.0, "_source": doc})
                    })
                    .collect();
                (
                    200,
                    json!({
                        "took": 1,
                        "timed_out": false,
                        "hits": {
                            "total": {"value": hits.len(), "relation": "eq"},
                            "hits": hits
                        }
                    }),
                )
            }
        },
        _ => error(405, "unsupported", format!("{method} {path}")),
    }
}
