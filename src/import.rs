use async_trait::async_trait;
use thiserror::Error;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::model::{Document, DEFAULT_TITLE};
use crate::notify::{Notifier, ToastLevel};
use crate::store::DocumentStore;

const ACCEPTED_MIME_TYPES: [&str; 2] = ["text/markdown", "text/plain"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("{name}: file type not supported. Only .md, markdown and plain text files can be imported.")]
    UnsupportedType { name: String },
    #[error("{name}: could not read file ({reason})")]
    Read { name: String, reason: String },
    #[error("{name}: could not save imported document")]
    Save { name: String },
}

/// A file offered for import, from the picker or a drop.
#[async_trait(?Send)]
pub trait ImportFile {
    fn name(&self) -> String;
    fn mime_type(&self) -> String;
    async fn read_text(&self) -> Result<String, String>;
}

#[async_trait(?Send)]
impl ImportFile for web_sys::File {
    fn name(&self) -> String {
        web_sys::File::name(self)
    }

    fn mime_type(&self) -> String {
        self.type_()
    }

    async fn read_text(&self) -> Result<String, String> {
        let value = JsFuture::from(self.text())
            .await
            .map_err(|err| format!("{err:?}"))?;
        value
            .dyn_into::<js_sys::JsString>()
            .map(String::from)
            .map_err(|_| "file content is not text".to_string())
    }
}

pub fn check_import(name: &str, mime_type: &str) -> Result<(), ImportError> {
    let is_markdown_name = name.to_ascii_lowercase().ends_with(".md");
    let mime = mime_type.trim().to_ascii_lowercase();
    let is_text_mime = ACCEPTED_MIME_TYPES.iter().any(|accepted| mime == *accepted);
    if is_markdown_name || is_text_mime {
        Ok(())
    } else {
        Err(ImportError::UnsupportedType {
            name: name.to_string(),
        })
    }
}

/// File name without its last extension; the default title when nothing
/// is left.
pub fn title_from_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };
    let stem = stem.trim();
    if stem.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        stem.to_string()
    }
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: Vec<Document>,
    pub failed: Vec<ImportError>,
}

/// Imports files one after another. A rejected or failing file is reported
/// and skipped; the rest still go through.
pub async fn import_files<F: ImportFile>(
    store: &DocumentStore,
    notifier: &dyn Notifier,
    files: &[F],
) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for file in files {
        let name = file.name();
        if let Err(err) = check_import(&name, &file.mime_type()) {
            notifier.notify(ToastLevel::Error, err.to_string());
            summary.failed.push(err);
            continue;
        }
        let content = match file.read_text().await {
            Ok(content) => content,
            Err(reason) => {
                let err = ImportError::Read { name, reason };
                notifier.notify(ToastLevel::Error, err.to_string());
                summary.failed.push(err);
                continue;
            }
        };
        // The store reports its own failure.
        match store.import_document(&name, content).await {
            Ok(doc) => {
                log::info!("imported {name} as {}", doc.id);
                summary.imported.push(doc);
            }
            Err(_) => summary.failed.push(ImportError::Save { name }),
        }
    }
    if !summary.imported.is_empty() {
        let count = summary.imported.len();
        let noun = if count == 1 { "document" } else { "documents" };
        notifier.notify(ToastLevel::Success, format!("Imported {count} {noun}"));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::clock::ManualClock;
    use crate::notify::RecordingNotifier;
    use futures::executor::block_on;
    use std::rc::Rc;
    use uuid::Uuid;

    struct FakeFile {
        name: &'static str,
        mime: &'static str,
        body: Result<&'static str, &'static str>,
    }

    #[async_trait(?Send)]
    impl ImportFile for FakeFile {
        fn name(&self) -> String {
            self.name.to_string()
        }

        fn mime_type(&self) -> String {
            self.mime.to_string()
        }

        async fn read_text(&self) -> Result<String, String> {
            self.body.map(str::to_string).map_err(str::to_string)
        }
    }

    fn signed_in_store() -> (DocumentStore, Rc<MemoryBackend>, Rc<RecordingNotifier>) {
        let clock = Rc::new(ManualClock::at_millis(0));
        let backend = Rc::new(MemoryBackend::new(clock.clone()));
        let notifier = Rc::new(RecordingNotifier::default());
        let store = DocumentStore::new(backend.clone(), notifier.clone(), clock);
        block_on(store.set_owner(Some(Uuid::new_v4())));
        (store, backend, notifier)
    }

    #[test]
    fn accepts_markdown_names_and_text_mimes() {
        assert!(check_import("notes.MD", "").is_ok());
        assert!(check_import("notes", "text/markdown").is_ok());
        assert!(check_import("notes.txt", "text/plain").is_ok());
        assert!(check_import("photo.png", "image/png").is_err());
    }

    #[test]
    fn titles_come_from_file_names() {
        assert_eq!(title_from_file_name("Meeting notes.md"), "Meeting notes");
        assert_eq!(title_from_file_name("dir/sub/archive.tar.md"), "archive.tar");
        assert_eq!(title_from_file_name(".md"), ".md");
        assert_eq!(title_from_file_name("  .txt"), DEFAULT_TITLE);
    }

    #[test]
    fn png_is_rejected_and_nothing_is_created() {
        let (store, backend, notifier) = signed_in_store();
        let files = [FakeFile {
            name: "diagram.png",
            mime: "image/png",
            body: Ok("\u{89}PNG"),
        }];
        let summary = block_on(import_files(&store, notifier.as_ref(), &files));
        assert!(summary.imported.is_empty());
        assert!(backend.documents.borrow().is_empty());
        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("file type not supported"));
    }

    #[test]
    fn one_bad_file_does_not_stop_the_batch() {
        let (store, backend, notifier) = signed_in_store();
        let files = [
            FakeFile {
                name: "a.md",
                mime: "text/markdown",
                body: Ok("# A"),
            },
            FakeFile {
                name: "broken.md",
                mime: "",
                body: Err("NotReadableError"),
            },
            FakeFile {
                name: "b.txt",
                mime: "text/plain",
                body: Ok("plain b"),
            },
        ];
        let summary = block_on(import_files(&store, notifier.as_ref(), &files));
        let titles: Vec<_> = summary.imported.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(backend.documents.borrow().len(), 2);
        assert!(summary
            .imported
            .iter()
            .all(|d| d.tags == vec![crate::model::IMPORTED_TAG.to_string()]));
    }
}
