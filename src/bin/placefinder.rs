//! CLI entry point: `generate` (out-of-scope ingestion stub) and `server`
//! (minimal HTTP glue over the three engine operations), per §6.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use placefinder::{Engine, GeoError, LoadOptions};

#[derive(Parser)]
#[command(name = "placefinder", about = "Offline place-name geocoder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds a database from planetary source data.
    Generate {
        /// Planet data source (out of scope; accepted so the flag exists).
        #[arg(long)]
        planet: Option<String>,
        /// Who's On First source (out of scope; accepted so the flag exists).
        #[arg(long)]
        whos_on_first: Option<String>,
        /// Wikimedia importance source (out of scope; accepted so the flag exists).
        #[arg(long)]
        wikimedia_importance: Option<String>,
        /// Path to write the built container to.
        #[arg(long, default_value = "places.db")]
        output: String,
    },
    /// Starts the read-only query server.
    Server {
        /// Path to the database file to serve.
        #[arg(long, default_value = "places.db")]
        database: String,
        /// TCP port to bind.
        #[arg(long, default_value_t = 3000)]
        port: u16,
        /// Load the forward index (trie + n-gram).
        #[arg(long, default_value_t = true)]
        enable_forward: bool,
        /// Load the reverse index (k-d tree).
        #[arg(long, default_value_t = true)]
        enable_reverse: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Generate { output, .. } => generate(&output),
        Command::Server {
            database,
            port,
            enable_forward,
            enable_reverse,
        } => serve(&database, port, enable_forward, enable_reverse),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn generate(_output: &str) -> Result<(), GeoError> {
    Err(GeoError::Unsupported(
        "building a database from planetary sources (planet/whos_on_first/wikimedia_importance \
         ingestion) is an external pipeline this crate does not embed; feed already-resolved \
         nodes to placefinder::ContainerBuilder directly",
    ))
}

fn serve(database: &str, port: u16, enable_forward: bool, enable_reverse: bool) -> Result<(), GeoError> {
    let engine = Arc::new(Engine::open(
        database,
        LoadOptions {
            enable_forward,
            enable_reverse,
        },
    )?);

    let listener = TcpListener::bind(("0.0.0.0", port)).map_err(|source| {
        log::error!("failed to bind port {port}: {source}");
        GeoError::Unsupported("failed to bind the server socket")
    })?;
    log::info!("listening on port {port}");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &engine) {
                        log::debug!("connection error: {err}");
                    }
                });
            }
            Err(err) => log::debug!("failed to accept connection: {err}"),
        }
    }

    Ok(())
}

struct Request {
    path: String,
    query: Vec<(String, String)>,
}

fn parse_request_line(line: &str) -> Option<Request> {
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;

    let (path, query_string) = target.split_once('?').unwrap_or((target, ""));
    let query = query_string
        .split('&')
        .filter(|s| !s.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            Some((url_decode(k), url_decode(v)))
        })
        .collect();

    Some(Request {
        path: path.to_string(),
        query,
    })
}

fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(value) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl Request {
    fn param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn handle_connection(mut stream: TcpStream, engine: &Engine) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;

    let Some(request) = parse_request_line(&line) else {
        return write_response(&mut stream, 400, "", &[], "bad request");
    };

    // Drain and discard headers; this glue does not need them.
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line)? == 0 || header_line.trim().is_empty() {
            break;
        }
    }

    route(&request, engine, &mut stream)
}

fn route(request: &Request, engine: &Engine, stream: &mut TcpStream) -> std::io::Result<()> {
    match request.path.as_str() {
        "/" => handle_forward(request, engine, stream),
        "/reverse" => handle_reverse(request, engine, stream),
        path if path.starts_with("/node/") => handle_node(path, request, engine, stream),
        _ => write_response(stream, 404, "", &[], r#"{"error":"not found"}"#),
    }
}

fn handle_forward(request: &Request, engine: &Engine, stream: &mut TcpStream) -> std::io::Result<()> {
    let query = request.param("q").unwrap_or("");
    let lang = request.param("lang").unwrap_or("");
    let complete = request.param("complete") == Some("true");
    let cache = request.param("cache").map(|v| v == "true").unwrap_or(true);

    let (max_results, use_cache) = if complete {
        (-1, false)
    } else {
        let max = request
            .param("max")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(10);
        (max, cache)
    };

    let result = engine.forward(query, max_results, use_cache, lang);
    let body = serde_json::json!({
        "found": result.found,
        "results": result.results.iter().map(place_json).collect::<Vec<_>>(),
    });
    let header = [("X-Geocache", if result.cache_hit { "HIT" } else { "MISS" })];
    write_response(stream, 200, "application/json", &header, &body.to_string())
}

fn handle_reverse(request: &Request, engine: &Engine, stream: &mut TcpStream) -> std::io::Result<()> {
    let lang = request.param("lang").unwrap_or("");
    let lat: f32 = request.param("lat").and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let lng: f32 = request.param("lng").and_then(|v| v.parse().ok()).unwrap_or(0.0);

    let results = engine.reverse(lat, lng, lang);
    let body = serde_json::json!({
        "results": results.iter().map(place_json).collect::<Vec<_>>(),
    });
    write_response(stream, 200, "application/json", &[], &body.to_string())
}

fn handle_node(path: &str, request: &Request, engine: &Engine, stream: &mut TcpStream) -> std::io::Result<()> {
    let lang = request.param("lang").unwrap_or("");
    let id_str = path.trim_start_matches("/node/");
    let Ok(id) = id_str.parse::<i64>() else {
        return write_response(stream, 400, "application/json", &[], r#"{"error":"invalid id"}"#);
    };

    let body = match engine.node(id, lang) {
        Some(place) => place_json(&place).to_string(),
        None => "{}".to_string(),
    };
    write_response(stream, 200, "application/json", &[], &body)
}

fn place_json(place: &placefinder::PlaceResult) -> serde_json::Value {
    serde_json::json!({
        "id": place.id,
        "name": place.name,
        "region": place.region,
        "sub_region": place.sub_region,
        "country": place.country,
        "timezone": place.timezone,
        "population": place.population,
        "rank": place.rank,
        "coordinates": [place.center.0, place.center.1],
        "bounding_box": [
            place.bounding_box.0,
            place.bounding_box.1,
            place.bounding_box.2,
            place.bounding_box.3,
        ],
    })
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Error",
    };
    let content_type = if content_type.is_empty() { "text/plain" } else { content_type };

    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n",
        body.len()
    );
    for (key, value) in extra_headers {
        response.push_str(&format!("{key}: {value}\r\n"));
    }
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(body);

    stream.write_all(response.as_bytes())
}
