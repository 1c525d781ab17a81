use std::collections::HashMap;
use std::io::{Cursor, Read as _};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

pub const EMAIL: &str = "student@example.com";
pub const PASSWORD: &str = "secret";
pub const SESSION_TOKEN: &str = "token123";
pub const DOC_PATH: &str = "/doc/x-pc-2023";
pub const DOC_TITLE: &str = "Polytechnique PC 2023";

#[derive(Debug, Clone, Copy)]
pub struct FixtureConfig {
    /// The puzzle table shows up from this request of the puzzle page on (1-based).
    pub puzzle_solved_from: usize,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            puzzle_solved_from: 2,
        }
    }
}

/// A tiny copy of the correction site: login, one listing, one document with
/// a puzzle page and an image page.
pub struct FixtureSite {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FixtureSite {
    pub fn spawn(config: FixtureConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start fixture server");
        let base_url = format!("http://{}", server.server_addr());
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let server_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            let tile_pngs: Vec<Vec<u8>> = [[200, 0, 0], [0, 200, 0], [0, 0, 200], [90, 90, 90]]
                .into_iter()
                .map(|rgb| png(40, 30, rgb))
                .collect();
            let scan_png = png(1200, 600, [250, 250, 250]);

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split(['?', '#']).next().unwrap_or(&url).to_owned();
                let hit = {
                    let mut hits = server_hits.lock().expect("hits lock");
                    let count = hits.entry(path.clone()).or_insert(0);
                    *count += 1;
                    *count
                };

                if path == "/bin/users/connexion.html" {
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let accepted = body.contains("login=student%40example.com")
                        && body.contains(&format!("passwd={PASSWORD}"));
                    let mut response = html_response("<html><body>connexion</body></html>");
                    if accepted {
                        response = response.with_header(header(
                            "Set-Cookie",
                            &format!("ck_id={SESSION_TOKEN}; Path=/"),
                        ));
                    }
                    let _ = request.respond(response);
                    continue;
                }

                let authorized = request.headers().iter().any(|h| {
                    h.field.equiv("Cookie")
                        && h.value.as_str().contains(&format!("ck_id={SESSION_TOKEN}"))
                });
                if !authorized {
                    let _ = request.respond(
                        tiny_http::Response::from_string("login required").with_status_code(403),
                    );
                    continue;
                }

                let response = match path.as_str() {
                    "/main.html" => html_response(&format!(
                        r#"<!doctype html><html><body>
<div class="center maincolumn"><ul>
  <li><a href="{DOC_PATH}">{DOC_TITLE}</a></li>
  <li><a href="doc/x-pc-2023#solutions">{DOC_TITLE} (solutions)</a></li>
</ul></div>
</body></html>"#
                    )),
                    DOC_PATH => html_response(&format!(
                        r#"<!doctype html><html><body>
<h1>{DOC_TITLE}</h1>
<div class="center maincolumn">
  <section>
    <span><a href="{DOC_PATH}/q1">Question 1</a></span>
    <span><a href="">pending</a></span>
    <span><a href="q2-scan">Question 2</a></span>
  </section>
</div>
</body></html>"#
                    )),
                    "/doc/x-pc-2023/q1" => {
                        let table = if hit >= config.puzzle_solved_from {
                            r#"<table>
  <tr><td><img src="/tiles/0.png"></td><td><img src="/tiles/1.png"></td></tr>
  <tr><td><img src="/tiles/2.png"></td><td><img src="/tiles/3.png"></td></tr>
</table>"#
                        } else {
                            "<p>loading puzzle</p>"
                        };
                        html_response(&format!(
                            r#"<!doctype html><html><body>
<div class="center maincolumn"><center><div class="puzzle"><div>{table}</div></div></center></div>
</body></html>"#
                        ))
                    }
                    "/doc/q2-scan" => html_response(
                        r#"<!doctype html><html><body>
<div class="center maincolumn"><img src="/scans/q2.png"></div>
</body></html>"#,
                    ),
                    "/scans/q2.png" => png_response(&scan_png),
                    tile if tile.starts_with("/tiles/") => {
                        let index = tile
                            .trim_start_matches("/tiles/")
                            .trim_end_matches(".png")
                            .parse::<usize>()
                            .ok()
                            .and_then(|i| tile_pngs.get(i));
                        match index {
                            Some(bytes) => png_response(bytes),
                            None => not_found(),
                        }
                    }
                    _ => not_found(),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_hits(&self) {
        self.hits.lock().expect("hits lock").clear();
    }
}

impl Drop for FixtureSite {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn write_account(dir: &std::path::Path, password: &str) {
    let account = serde_json::json!({ "email": EMAIL, "password": password });
    std::fs::write(dir.join("account.json"), account.to_string()).expect("write account.json");
}

fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

fn header(name: &str, value: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("build header")
}

fn html_response(body: &str) -> tiny_http::Response<Cursor<Vec<u8>>> {
    tiny_http::Response::from_string(body)
        .with_header(header("Content-Type", "text/html; charset=utf-8"))
}

fn png_response(bytes: &[u8]) -> tiny_http::Response<Cursor<Vec<u8>>> {
    tiny_http::Response::from_data(bytes.to_vec()).with_header(header("Content-Type", "image/png"))
}

fn not_found() -> tiny_http::Response<Cursor<Vec<u8>>> {
    tiny_http::Response::from_string("not found").with_status_code(404)
}
