use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use ragpdf_core::error::Error;
use ragpdf_core::traits::Generator;
use ragpdf_core::types::GenerationParams;
use ragpdf_llm::OllamaGenerator;

/// Answer one HTTP request with `status` and `body` after `delay`, returning
/// the base URL and a handle yielding the raw request.
fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let request = read_request(&mut stream);
        thread::sleep(delay);
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(response.as_bytes());
        request
    });
    (base, handle)
}

fn read_request(stream: &mut std::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length").then(|| v.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn generator(base: &str, timeout: Duration) -> OllamaGenerator {
    OllamaGenerator::with_timeout(base, "mistral", timeout).unwrap()
}

#[test]
fn generate_posts_prompt_and_returns_response() {
    let (base, handle) = serve_once("200 OK", r#"{"model":"mistral","response":"  Forty two.  ","done":true}"#, Duration::ZERO);
    let gen = generator(&base, Duration::from_secs(5));
    let params = GenerationParams { temperature: 0.2, max_tokens: 64 };

    let out = gen.generate("What is the answer?", &params).unwrap();
    assert_eq!(out, "Forty two.");

    let request = handle.join().unwrap();
    assert!(request.starts_with("POST /api/generate"));
    assert!(request.contains("\"stream\":false"));
    assert!(request.contains("What is the answer?"));
    assert!(request.contains("\"num_predict\":64"));
}

#[test]
fn missing_model_maps_to_model_not_found() {
    let (base, _h) = serve_once("404 Not Found", r#"{"error":"model 'mistral' not found, try pulling it first"}"#, Duration::ZERO);
    let err = generator(&base, Duration::from_secs(5)).generate("hi", &GenerationParams::default()).unwrap_err();
    match err {
        Error::ModelNotFound { model, detail } => {
            assert_eq!(model, "mistral");
            assert!(detail.contains("ollama pull mistral"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn server_error_is_unavailable() {
    let (base, _h) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#, Duration::ZERO);
    let err = generator(&base, Duration::from_secs(5)).generate("hi", &GenerationParams::default()).unwrap_err();
    assert!(matches!(err, Error::GenerationUnavailable(_)), "got {err:?}");
}

#[test]
fn refused_connection_is_unavailable() {
    let port = {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let base = format!("http://127.0.0.1:{port}");
    let err = generator(&base, Duration::from_secs(2)).generate("hi", &GenerationParams::default()).unwrap_err();
    match err {
        Error::GenerationUnavailable(msg) => assert!(msg.contains(&base), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn slow_server_times_out() {
    let (base, _h) = serve_once("200 OK", r#"{"response":"late"}"#, Duration::from_millis(1500));
    let err = generator(&base, Duration::from_millis(200)).generate("hi", &GenerationParams::default()).unwrap_err();
    assert!(matches!(err, Error::GenerationTimeout(_)), "got {err:?}");
}

#[test]
fn check_model_accepts_latest_tag() {
    let (base, handle) = serve_once("200 OK", r#"{"models":[{"name":"llama3:8b"},{"name":"mistral:latest"}]}"#, Duration::ZERO);
    generator(&base, Duration::from_secs(5)).check_model().unwrap();
    assert!(handle.join().unwrap().starts_with("GET /api/tags"));
}

#[test]
fn check_model_reports_unpulled_model() {
    let (base, _h) = serve_once("200 OK", r#"{"models":[{"name":"llama3:8b"}]}"#, Duration::ZERO);
    let err = generator(&base, Duration::from_secs(5)).check_model().unwrap_err();
    assert!(matches!(err, Error::ModelNotFound { .. }), "got {err:?}");
}
