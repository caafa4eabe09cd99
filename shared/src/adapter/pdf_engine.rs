//! Structural PDF edits performed in-process with `lopdf`: merge, page
//! selection/removal, reordering, rotation, crop, and watermark stamping.
//! Password-grade encryption is delegated to the `qpdf` subprocess below —
//! a pure structural library has no business owning crypto.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::{AppError, ErrorCode};

use super::process;

fn load(bytes: &[u8]) -> Result<Document, AppError> {
    Document::load_mem(bytes).map_err(|e| AppError::bad_payload(format!("not a readable PDF: {e}")))
}

fn save(doc: &mut Document) -> Result<Vec<u8>, AppError> {
    doc.compress();
    let mut out = Vec::new();
    doc.save_to(&mut out).map_err(|e| AppError::internal(e.to_string()))?;
    Ok(out)
}

/// Concatenates `inputs` in order into a single document, renumbering every
/// object so the source documents' id spaces never collide.
pub fn merge(inputs: &[Vec<u8>]) -> Result<Vec<u8>, AppError> {
    if inputs.is_empty() {
        return Err(AppError::bad_payload("merge requires at least one input file"));
    }

    let mut max_id = 1u32;
    let mut documents_pages: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut documents_objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut document = Document::with_version("1.5");

    for bytes in inputs {
        let mut doc = load(bytes)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        documents_pages.extend(
            doc.get_pages()
                .into_values()
                .filter_map(|object_id| doc.get_object(object_id).ok().map(|o| (object_id, o.clone()))),
        );
        documents_objects.extend(doc.objects.clone());
    }

    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_root: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in &documents_objects {
        let Ok(dict) = object.as_dict() else { continue };
        match dict.get(b"Type").and_then(Object::as_name_str).unwrap_or("") {
            "Catalog" => catalog = Some((*id, dict.clone())),
            "Pages" if pages_root.is_none() => pages_root = Some((*id, dict.clone())),
            _ => {}
        }
    }

    let (pages_id, mut pages_dict) = pages_root.ok_or_else(|| AppError::internal("source PDF has no Pages root"))?;
    let (catalog_id, mut catalog_dict) = catalog.ok_or_else(|| AppError::internal("source PDF has no Catalog"))?;

    for (id, object) in documents_pages.iter() {
        if let Ok(dict) = object.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            documents_objects.insert(*id, Object::Dictionary(dict));
        }
    }

    pages_dict.set(
        "Kids",
        documents_pages.keys().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
    );
    pages_dict.set("Count", documents_pages.len() as i64);
    documents_objects.insert(pages_id, Object::Dictionary(pages_dict));

    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    documents_objects.insert(catalog_id, Object::Dictionary(catalog_dict));

    document.objects = documents_objects;
    document.max_id = max_id;
    document.trailer.set("Root", catalog_id);
    document.renumber_objects();
    document.adjust_zero_pages();

    save(&mut document)
}

/// Extracts `pages` (1-based, sorted, deduplicated) into a new document
/// preserving their relative order.
pub fn select_pages(bytes: &[u8], pages: &[u32]) -> Result<Vec<u8>, AppError> {
    let mut doc = load(bytes)?;
    let all_pages = doc.get_pages();
    let wanted: Vec<ObjectId> = pages
        .iter()
        .filter_map(|p| all_pages.get(p).copied())
        .collect();
    if wanted.is_empty() {
        return Err(AppError::bad_payload("no requested pages exist in the source document"));
    }
    doc.delete_pages(
        &all_pages
            .iter()
            .filter(|(num, _)| !pages.contains(num))
            .map(|(num, _)| *num)
            .collect::<Vec<_>>(),
    );
    save(&mut doc)
}

/// Reorders the document's pages to match `order`, a permutation of
/// `1..=total_pages`. Callers must validate the permutation before calling.
pub fn organize(bytes: &[u8], order: &[u32]) -> Result<Vec<u8>, AppError> {
    let mut doc = load(bytes)?;
    let pages = doc.get_pages();
    let kids: Vec<Object> = order
        .iter()
        .filter_map(|p| pages.get(p).copied())
        .map(Object::Reference)
        .collect();
    if kids.len() != order.len() {
        return Err(AppError::bad_payload("organize order references a page outside the document"));
    }

    let catalog = doc.catalog().map_err(|e| AppError::internal(e.to_string()))?;
    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let pages_obj = doc.get_object_mut(pages_id).map_err(|e| AppError::internal(e.to_string()))?;
    let dict = pages_obj.as_dict_mut().map_err(|e| AppError::internal(e.to_string()))?;
    dict.set("Kids", kids);

    save(&mut doc)
}

/// Adds `degrees` (positive or negative multiple of 90) to the existing
/// `/Rotate` of every page in `page_spec`, modulo 360. `page_spec` of `None`
/// applies to every page.
pub fn rotate(bytes: &[u8], page_spec: Option<&[u32]>, degrees: i32) -> Result<Vec<u8>, AppError> {
    let mut doc = load(bytes)?;
    let pages = doc.get_pages();
    let targets: Vec<ObjectId> = match page_spec {
        Some(spec) => spec.iter().filter_map(|p| pages.get(p).copied()).collect(),
        None => pages.values().copied().collect(),
    };

    for id in targets {
        let existing = doc
            .get_object(id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"Rotate").ok())
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let updated = (((existing + degrees as i64) % 360) + 360) % 360;
        if let Ok(object) = doc.get_object_mut(id) {
            if let Ok(dict) = object.as_dict_mut() {
                dict.set("Rotate", updated);
            }
        }
    }

    save(&mut doc)
}

pub enum MarginUnit {
    Points,
    Percent,
}

pub struct Margins {
    pub unit: MarginUnit,
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

/// Sets each page's visible box (`/CropBox`) derived from that page's own
/// `/MediaBox` and `margins`. A page whose resulting width or height would
/// be non-positive is left unchanged.
pub fn crop(bytes: &[u8], margins: &Margins) -> Result<Vec<u8>, AppError> {
    let mut doc = load(bytes)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    for id in page_ids {
        let media_box = doc
            .get_object(id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"MediaBox").ok())
            .and_then(|o| o.as_array().ok())
            .and_then(array_to_rect);
        let Some((x0, y0, x1, y1)) = media_box else { continue };
        let width = x1 - x0;
        let height = y1 - y0;

        let (top, bottom, left, right) = match margins.unit {
            MarginUnit::Points => (margins.top, margins.bottom, margins.left, margins.right),
            MarginUnit::Percent => (
                height * margins.top / 100.0,
                height * margins.bottom / 100.0,
                width * margins.left / 100.0,
                width * margins.right / 100.0,
            ),
        };

        let new_x0 = x0 + left;
        let new_y0 = y0 + bottom;
        let new_x1 = x1 - right;
        let new_y1 = y1 - top;
        if new_x1 - new_x0 <= 0.0 || new_y1 - new_y0 <= 0.0 {
            continue;
        }

        if let Ok(object) = doc.get_object_mut(id) {
            if let Ok(dict) = object.as_dict_mut() {
                dict.set(
                    "CropBox",
                    vec![
                        Object::Real(new_x0),
                        Object::Real(new_y0),
                        Object::Real(new_x1),
                        Object::Real(new_y1),
                    ],
                );
            }
        }
    }

    save(&mut doc)
}

fn array_to_rect(arr: &[Object]) -> Option<(f32, f32, f32, f32)> {
    if arr.len() != 4 {
        return None;
    }
    let v: Vec<f32> = arr.iter().filter_map(|o| o.as_float().ok().or_else(|| o.as_i64().ok().map(|i| i as f32))).collect();
    if v.len() != 4 {
        return None;
    }
    Some((v[0], v[1], v[2], v[3]))
}

pub enum WatermarkPosition {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Appends a semi-transparent text watermark to the content stream of every
/// page. `text` must already be validated non-empty by the handler.
pub fn watermark(bytes: &[u8], text: &str, opacity: f32, position: WatermarkPosition) -> Result<Vec<u8>, AppError> {
    let mut doc = load(bytes)?;
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

    let gs_dict_id = doc.add_object(Object::Dictionary({
        let mut d = Dictionary::new();
        d.set("Type", "ExtGState");
        d.set("ca", Object::Real(opacity.clamp(0.0, 1.0)));
        d
    }));

    for id in page_ids {
        let media_box = doc
            .get_object(id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"MediaBox").ok())
            .and_then(|o| o.as_array().ok())
            .and_then(array_to_rect)
            .unwrap_or((0.0, 0.0, 612.0, 792.0));
        let (x, y) = watermark_origin(&position, media_box);

        let operations = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(b"WmGs".to_vec())]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"WmFont".to_vec()), Object::Real(36.0)]),
            Operation::new("Tr", vec![Object::Integer(0)]),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];
        let content = Content { operations };
        let stream_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap_or_default()));

        if let Ok(object) = doc.get_object_mut(id) {
            if let Ok(dict) = object.as_dict_mut() {
                append_content_stream(dict, stream_id);
                attach_watermark_gs_resource(dict, gs_dict_id);
            }
        }
    }

    save(&mut doc)
}

fn watermark_origin(position: &WatermarkPosition, (x0, y0, x1, y1): (f32, f32, f32, f32)) -> (f32, f32) {
    let width = x1 - x0;
    let height = y1 - y0;
    match position {
        WatermarkPosition::Center => (x0 + width / 3.0, y0 + height / 2.0),
        WatermarkPosition::TopLeft => (x0 + 36.0, y1 - 72.0),
        WatermarkPosition::TopRight => (x1 - 200.0, y1 - 72.0),
        WatermarkPosition::BottomLeft => (x0 + 36.0, y0 + 36.0),
        WatermarkPosition::BottomRight => (x1 - 200.0, y0 + 36.0),
    }
}

fn append_content_stream(dict: &mut Dictionary, stream_id: ObjectId) {
    match dict.get(b"Contents").ok().cloned() {
        Some(Object::Array(mut arr)) => {
            arr.push(Object::Reference(stream_id));
            dict.set("Contents", arr);
        }
        Some(existing @ Object::Reference(_)) => {
            dict.set("Contents", vec![existing, Object::Reference(stream_id)]);
        }
        _ => {
            dict.set("Contents", Object::Reference(stream_id));
        }
    }
}

fn attach_watermark_gs_resource(dict: &mut Dictionary, gs_dict_id: ObjectId) {
    let mut resources = match dict.get(b"Resources").ok().and_then(|o| o.as_dict().ok()).cloned() {
        Some(d) => d,
        None => Dictionary::new(),
    };
    let mut ext_g_state = match resources.get(b"ExtGState").ok().and_then(|o| o.as_dict().ok()).cloned() {
        Some(d) => d,
        None => Dictionary::new(),
    };
    ext_g_state.set("WmGs", Object::Reference((gs_dict_id.0, gs_dict_id.1)));
    resources.set("ExtGState", ext_g_state);
    dict.set("Resources", resources);
}

/// Encrypts `bytes` with `password` (owner and user password set equal) via
/// `qpdf --encrypt`, the strongest symmetric scheme it supports by default.
pub async fn protect(bytes: &[u8], password: &str) -> Result<Vec<u8>, AppError> {
    run_qpdf_roundtrip(
        bytes,
        vec![
            "--encrypt".to_string(),
            password.to_string(),
            password.to_string(),
            "256".to_string(),
            "--".to_string(),
        ],
        super::QPDF_DEADLINE,
    )
    .await
}

/// Decrypts `bytes` with `password` via `qpdf --decrypt --password=...`.
/// Maps qpdf's wrong-password stderr pattern to `INVALID_PASSWORD`.
pub async fn unlock(bytes: &[u8], password: &str) -> Result<Vec<u8>, AppError> {
    run_qpdf_roundtrip(bytes, vec![format!("--password={password}"), "--decrypt".to_string()], super::QPDF_DEADLINE).await
}

/// One of the four bounded "quick" repair rewrites tried, in order, by the
/// repair handler's `auto`/`quick` methods before it falls back to a deep
/// re-render. Each is a different qpdf structural pass over the same file.
#[derive(Debug, Clone, Copy)]
pub enum QuickRepairStrategy {
    /// `--linearize`: rebuilds the file for fast first-page access, which as
    /// a side effect forces qpdf to fully re-walk and re-emit the object
    /// graph, fixing many xref/object-stream corruptions.
    Relinearize,
    /// A plain read-then-write with no extra flags: qpdf's default recovery
    /// of a damaged xref table.
    ReEmit,
    /// Re-emits with object streams disabled, recovering files whose
    /// corruption is isolated to a cross-reference/object stream.
    DisableObjectStreams,
    /// `--qdf` plus dropping unreferenced resources: the most invasive quick
    /// pass, useful when the page tree itself carries dangling references.
    StructuralClean,
}

/// Runs one [`QuickRepairStrategy`] over `bytes`, bounded by
/// [`super::REPAIR_ATTEMPT_DEADLINE`] so a single attempt can never eat the
/// whole per-job deadline.
pub async fn quick_repair(bytes: &[u8], strategy: QuickRepairStrategy) -> Result<Vec<u8>, AppError> {
    let args = match strategy {
        QuickRepairStrategy::Relinearize => vec!["--linearize".to_string()],
        QuickRepairStrategy::ReEmit => vec![],
        QuickRepairStrategy::DisableObjectStreams => vec!["--object-streams=disable".to_string()],
        QuickRepairStrategy::StructuralClean => vec!["--qdf".to_string(), "--remove-unreferenced-resources=yes".to_string()],
    };
    run_qpdf_roundtrip(bytes, args, super::REPAIR_ATTEMPT_DEADLINE).await
}

async fn run_qpdf_roundtrip(bytes: &[u8], mut qpdf_args: Vec<String>, deadline: std::time::Duration) -> Result<Vec<u8>, AppError> {
    let scratch = tempfile::tempdir().map_err(AppError::from)?;
    let input_path = scratch.path().join("in.pdf");
    let output_path = scratch.path().join("out.pdf");
    std::fs::write(&input_path, bytes).map_err(AppError::from)?;

    let mut args = Vec::new();
    args.append(&mut qpdf_args);
    args.push(input_path.to_string_lossy().to_string());
    args.push(output_path.to_string_lossy().to_string());

    let output = process::run("qpdf", &args, deadline, super::MAX_TOOL_OUTPUT_BYTES).await?;
    if !output.success() {
        let tail = output.stderr_tail(400).to_lowercase();
        if tail.contains("invalid password") || tail.contains("failed: invalid password") {
            return Err(AppError::new(ErrorCode::InvalidPassword, "the supplied password is incorrect"));
        }
        return Err(AppError::new(ErrorCode::ToolFailed, output.stderr_tail(400)));
    }

    std::fs::read(&output_path).map_err(AppError::from)
}
