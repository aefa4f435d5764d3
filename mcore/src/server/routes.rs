use std::{io::ErrorKind, path::Path};

use percent_encoding::percent_decode_str;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::{
    measure::{Measure, decode},
    server::{
        http::{Method, Request, Response, StatusCode},
        service::ServerShared,
    },
};

pub const CONVERT_PATH: &str = "/convert-measurements";
pub const MEASUREMENT_FIELD: &str = "convert-measurements";
pub const RECORDS_PREFIX: &str = "/measurements/";
pub const RECORD_ID_HEADER: &str = "X-Measurement-Id";

#[derive(Serialize)]
struct ConvertResponse<'a> {
    result: &'a [Measure],
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

pub(super) async fn route(shared: &ServerShared, req: &Request) -> Response {
    if req.path == CONVERT_PATH {
        return convert_measurements(shared, req).await;
    }

    if !matches!(req.method, Method::Get | Method::Head) {
        return Response::text(StatusCode::MethodNotAllowed, "method not allowed")
            .header("Allow", "GET, HEAD");
    }

    match req.path.strip_prefix(RECORDS_PREFIX) {
        Some(id) => get_record(shared, id).await,
        None => serve_static(&shared.static_dir, &req.path).await,
    }
}

/// Accepts any method, the field comes from the urlencoded body or the query.
async fn convert_measurements(shared: &ServerShared, req: &Request) -> Response {
    let measurements = req.form_value(MEASUREMENT_FIELD).unwrap_or_default();

    let result = match decode(&measurements) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "error converting measurements");
            return with_cors(Response::json(
                StatusCode::UnprocessableEntity,
                &ErrorResponse {
                    error: e.to_string(),
                },
            ));
        }
    };

    let mut response = with_cors(Response::json(
        StatusCode::Ok,
        &ConvertResponse { result: &result },
    ));

    // a failed store does not fail the conversion
    match shared.store.insert(&measurements, &result).await {
        Ok(record) => response = response.header(RECORD_ID_HEADER, record.id.as_str()),
        Err(e) => warn!(error = %e, "error storing measurement result"),
    }

    response
}

fn with_cors(response: Response) -> Response {
    response
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Expose-Headers", RECORD_ID_HEADER)
}

async fn get_record(shared: &ServerShared, id: &str) -> Response {
    match shared.store.get(id).await {
        Ok(Some(record)) => Response::json(StatusCode::Ok, &record),
        Ok(None) => Response::json(
            StatusCode::NotFound,
            &ErrorResponse {
                error: format!("no measurement with id {id}"),
            },
        ),
        Err(e) => {
            warn!(error = %e, id, "error reading measurement result");
            Response::json(
                StatusCode::InternalServerError,
                &ErrorResponse {
                    error: "error reading measurement result".into(),
                },
            )
        }
    }
}

async fn serve_static(root: &Path, path: &str) -> Response {
    // decoded first so an encoded ".." is caught too
    let path = match percent_decode_str(path).decode_utf8() {
        Ok(path) => path,
        Err(_) => return Response::text(StatusCode::BadRequest, "path is not valid utf-8"),
    };
    let rel = path.trim_start_matches('/');
    if rel
        .split('/')
        .any(|seg| seg == ".." || seg.contains('\\') || seg.contains('\0'))
    {
        return Response::text(StatusCode::Forbidden, "forbidden");
    }

    let mut full = root.join(rel);
    let is_dir = fs::metadata(&full).await.is_ok_and(|m| m.is_dir());
    if rel.is_empty() || path.ends_with('/') || is_dir {
        full.push("index.html");
    }

    match fs::read(&full).await {
        Ok(content) => Response::new(StatusCode::Ok).with_body(content_type(&full), content),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
            debug!(path = %full.display(), "static file not found");
            Response::text(StatusCode::NotFound, "not found")
        }
        Err(e) => {
            warn!(error = %e, path = %full.display(), "error reading static file");
            Response::text(StatusCode::InternalServerError, "internal server error")
        }
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}
