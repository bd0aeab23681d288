//! Organizing completed downloads into the media library tree.

mod files;
mod template;

pub use files::{
    fetch_cover, is_audio_file, is_cover_art, is_retryable_fs_error, move_file, scan_download,
    CoverError, ScanResult, AUDIO_EXTENSIONS, COVER_TIMEOUT,
};
pub use template::{
    render_folder, sanitize_component, FolderTokens, TemplateError, DEFAULT_TEMPLATE,
};
