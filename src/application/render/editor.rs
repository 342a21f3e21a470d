use std::{fmt, ops::Range};

use thiserror::Error;

use super::{
    document::MountedDocument,
    types::{Document, RenderTree},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    Editing,
    Previewing,
}

/// Invoked with the full buffer after every edit.
pub type ChangeCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("document is not in editing mode")]
    NotEditable,
    #[error("offset {offset} is outside the buffer or not on a character boundary")]
    InvalidOffset { offset: usize },
}

/// What the host should display.
#[derive(Debug, Clone, PartialEq)]
pub enum View<'a> {
    Raw(&'a str),
    Rendered(RenderTree),
}

/// Chooses between the raw editable buffer and the rendered tree, and keeps
/// the buffer in step with the externally supplied source.
///
/// External writes always win: [`set_source`](Self::set_source) discards any
/// unsaved edits.
pub struct EditorController {
    document: Document,
    buffer: Option<String>,
    on_change: Option<ChangeCallback>,
}

impl EditorController {
    pub fn new(document: Document) -> Self {
        let buffer = document.editable.then(|| document.source.clone());
        Self {
            document,
            buffer,
            on_change: None,
        }
    }

    pub fn with_change_callback(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn mode(&self) -> ViewMode {
        if self.buffer.is_some() {
            ViewMode::Editing
        } else {
            ViewMode::Previewing
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn buffer(&self) -> Option<&str> {
        self.buffer.as_deref()
    }

    pub fn insert(&mut self, offset: usize, text: &str) -> Result<(), EditError> {
        let buffer = self.buffer.as_mut().ok_or(EditError::NotEditable)?;
        if !buffer.is_char_boundary(offset) {
            return Err(EditError::InvalidOffset { offset });
        }
        buffer.insert_str(offset, text);
        self.notify();
        Ok(())
    }

    pub fn delete(&mut self, range: Range<usize>) -> Result<(), EditError> {
        let buffer = self.buffer.as_mut().ok_or(EditError::NotEditable)?;
        for offset in [range.start, range.end] {
            if !buffer.is_char_boundary(offset) {
                return Err(EditError::InvalidOffset { offset });
            }
        }
        if range.start > range.end {
            return Err(EditError::InvalidOffset {
                offset: range.start,
            });
        }
        buffer.replace_range(range, "");
        self.notify();
        Ok(())
    }

    pub fn replace_buffer(&mut self, text: impl Into<String>) -> Result<(), EditError> {
        let buffer = self.buffer.as_mut().ok_or(EditError::NotEditable)?;
        *buffer = text.into();
        self.notify();
        Ok(())
    }

    /// Replace the external source. In editing mode the buffer is reset to it
    /// unconditionally; the change callback is not invoked.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.document.source = source.into();
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.clone_from(&self.document.source);
        }
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.document.editable = editable;
        self.buffer = editable.then(|| self.document.source.clone());
    }

    pub fn set_show_structural_comments(&mut self, show: bool) {
        self.document.show_structural_comments = show;
    }

    /// Raw buffer in editing mode; otherwise a fresh render of the source.
    pub fn view(&self, mounted: &MountedDocument) -> View<'_> {
        match self.buffer.as_deref() {
            Some(buffer) => View::Raw(buffer),
            None => View::Rendered(mounted.render(&self.document)),
        }
    }

    fn notify(&mut self) {
        if let (Some(callback), Some(buffer)) = (self.on_change.as_mut(), self.buffer.as_deref()) {
            callback(buffer);
        }
    }
}

impl fmt::Debug for EditorController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorController")
            .field("document", &self.document)
            .field("buffer", &self.buffer)
            .field("has_callback", &self.on_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording(document: Document) -> (EditorController, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let controller = EditorController::new(document).with_change_callback(move |buffer| {
            sink.lock().expect("calls lock").push(buffer.to_string());
        });
        (controller, calls)
    }

    #[test]
    fn editable_flag_selects_mode() {
        let editing = EditorController::new(Document::new("a").with_editable(true));
        assert_eq!(editing.mode(), ViewMode::Editing);
        assert_eq!(editing.buffer(), Some("a"));

        let previewing = EditorController::new(Document::new("a"));
        assert_eq!(previewing.mode(), ViewMode::Previewing);
        assert_eq!(previewing.buffer(), None);
    }

    #[test]
    fn each_edit_reports_full_buffer_once() {
        let (mut controller, calls) = recording(Document::new("helo").with_editable(true));
        controller.insert(3, "l").expect("insert");
        controller.delete(0..1).expect("delete");
        controller.replace_buffer("bye").expect("replace");

        let calls = calls.lock().expect("calls lock");
        assert_eq!(*calls, vec!["hello", "ello", "bye"]);
    }

    #[test]
    fn external_source_discards_unsaved_edits() {
        let (mut controller, calls) = recording(Document::new("draft").with_editable(true));
        controller.insert(5, "!").expect("insert");
        controller.set_source("server copy");

        assert_eq!(controller.buffer(), Some("server copy"));
        assert_eq!(calls.lock().expect("calls lock").len(), 1);
    }

    #[test]
    fn previewing_rejects_edits() {
        let (mut controller, calls) = recording(Document::new("text"));
        assert_eq!(controller.insert(0, "x"), Err(EditError::NotEditable));
        assert_eq!(controller.delete(0..1), Err(EditError::NotEditable));
        assert!(calls.lock().expect("calls lock").is_empty());
    }

    #[test]
    fn invalid_offsets_are_rejected() {
        let mut controller = EditorController::new(Document::new("é").with_editable(true));
        assert_eq!(
            controller.insert(1, "x"),
            Err(EditError::InvalidOffset { offset: 1 })
        );
        assert_eq!(
            controller.delete(0..9),
            Err(EditError::InvalidOffset { offset: 9 })
        );
        assert_eq!(controller.buffer(), Some("é"));
    }

    #[test]
    fn toggling_editable_resets_buffer_from_source() {
        let mut controller = EditorController::new(Document::new("source").with_editable(true));
        controller.replace_buffer("edited").expect("replace");
        controller.set_editable(false);
        assert_eq!(controller.mode(), ViewMode::Previewing);
        controller.set_editable(true);
        assert_eq!(controller.buffer(), Some("source"));
    }
}
