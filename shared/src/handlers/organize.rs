use std::collections::BTreeSet;

use lopdf::Document;

use crate::adapter::pdf_engine;
use crate::dto::HandlerOutput;
use crate::error::AppError;

use super::{read_input, HandlerCtx};

/// Reorders every page per `order`. Unlike `pdf_engine::organize` (which only
/// checks that every requested page exists), this verifies `order` is an
/// exact permutation of `1..=total_pages` before touching the document.
pub async fn run(ctx: &HandlerCtx, input_path: &str, order: &[u32]) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;
    let total_pages = Document::load_mem(&bytes)
        .map_err(|e| AppError::bad_payload(format!("not a readable PDF: {e}")))?
        .get_pages()
        .len() as u32;

    if order.len() as u32 != total_pages {
        return Err(AppError::bad_payload(format!(
            "order lists {} pages but the document has {total_pages}",
            order.len()
        )));
    }
    let wanted: BTreeSet<u32> = (1..=total_pages).collect();
    let got: BTreeSet<u32> = order.iter().copied().collect();
    if got != wanted {
        return Err(AppError::bad_payload("order must be a permutation of every page exactly once"));
    }

    let result = pdf_engine::organize(&bytes, order)?;
    Ok(HandlerOutput::SingleFile { bytes: result, ext: "pdf" })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lopdf::{dictionary, Document, Object, Stream};

    use crate::config::Settings;
    use crate::temp_store::TempStore;

    use super::*;

    fn tiny_pdf(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids = Vec::new();
        for i in 0..pages {
            let content = Stream::new(dictionary! {}, format!("BT /F1 24 Tf (Page {i}) Tj ET").into_bytes());
            let content_id = doc.add_object(content);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => pages as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn ctx_with(bytes: &[u8]) -> (HandlerCtx, tempfile::TempDir, String) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TempStore::new(tmp.path().join("uploads"), tmp.path().join("downloads")).unwrap();
        let path = store.allocate_upload_slot();
        store.write_buffer(&path, bytes).unwrap();
        let rel = path.to_string_lossy().to_string();
        let ctx = HandlerCtx {
            store,
            settings: Arc::new(Settings::default()),
        };
        (ctx, tmp, rel)
    }

    #[tokio::test]
    async fn rejects_order_that_is_not_a_full_permutation() {
        let bytes = tiny_pdf(3);
        let (ctx, _tmp, rel) = ctx_with(&bytes);
        let err = run(&ctx, &rel, &[1, 2]).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::BadPayload);
    }

    #[tokio::test]
    async fn rejects_order_with_a_duplicate_page() {
        let bytes = tiny_pdf(3);
        let (ctx, _tmp, rel) = ctx_with(&bytes);
        let err = run(&ctx, &rel, &[1, 1, 3]).await.unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::BadPayload);
    }

    #[tokio::test]
    async fn accepts_a_genuine_reordering() {
        let bytes = tiny_pdf(3);
        let (ctx, _tmp, rel) = ctx_with(&bytes);
        let out = run(&ctx, &rel, &[3, 1, 2]).await.unwrap();
        match out {
            HandlerOutput::SingleFile { bytes, ext } => {
                assert_eq!(ext, "pdf");
                assert!(!bytes.is_empty());
            }
            _ => panic!("expected a single file"),
        }
    }
}
