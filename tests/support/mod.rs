#![allow(dead_code)]

use std::io::Read;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tiny_http::{Header, Response, Server};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }

    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.url.split_once('?')?.1;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then(|| v.to_string())
        })
    }
}

type Handler = dyn Fn(&Recorded) -> (u16, String) + Send + Sync;

/// Local HTTP server standing in for the FMC backend.
pub struct FakeBackend {
    server: Arc<Server>,
    port: u16,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeBackend {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> (u16, String) + Send + Sync + 'static,
    {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind fake backend"));
        let port = server
            .server_addr()
            .to_ip()
            .expect("fake backend listens on ip")
            .port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let server_thread = server.clone();
        let log = requests.clone();
        thread::spawn(move || {
            for mut request in server_thread.incoming_requests() {
                let mut raw = Vec::new();
                let _ = request.as_reader().read_to_end(&mut raw);
                let body = String::from_utf8_lossy(&raw).into_owned();
                let authorization = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("Authorization"))
                    .map(|header| header.value.as_str().to_string());
                let recorded = Recorded {
                    method: request.method().as_str().to_string(),
                    url: request.url().to_string(),
                    authorization,
                    body,
                };
                let (status, payload) = handler(&recorded);
                log.lock().push(recorded);
                let content_type = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                    .expect("static header");
                let response = Response::from_string(payload)
                    .with_status_code(status)
                    .with_header(content_type);
                let _ = request.respond(response);
            }
        });

        Self {
            server,
            port,
            requests,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/api", self.port)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.unblock();
    }
}

pub fn post_json(id: &str, author: &str, likers: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "_id": id,
        "postName": format!("Post {id}"),
        "postDescription": format!("About {id}"),
        "postImage": format!("https://cdn.example/{id}.jpg"),
        "likesCount": likers.len(),
        "likedBy": likers,
        "user": { "_id": author, "name": format!("User {author}") },
    })
}
