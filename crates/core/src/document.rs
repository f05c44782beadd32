use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chardetng::EncodingDetector;
use encoding_rs::{Encoding as RsEncoding, UTF_16BE, UTF_16LE, UTF_8};
use thiserror::Error;

/// 表示文件目前使用的行尾樣式。 / Represents the current line ending style for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    Cr,
}

impl LineEnding {
    /// 回傳序列化文字時使用的行尾字串。 / Returns the literal string used when serialising text.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }

    /// 回傳顯示於狀態列的標籤。 / Returns the label shown in the status bar.
    pub fn label(self) -> &'static str {
        match self {
            LineEnding::Lf => "LF",
            LineEnding::CrLf => "CRLF",
            LineEnding::Cr => "CR",
        }
    }
}

/// 載入時偵測到的文字編碼，儲存時原樣還原。 / Text encoding detected at load time and reproduced on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEncoding {
    charset: &'static RsEncoding,
    has_bom: bool,
}

impl TextEncoding {
    /// 建立不含 BOM 的 UTF-8 編碼，新文件的預設值。 / Plain UTF-8 without BOM, the default for fresh documents.
    pub fn utf8() -> Self {
        Self {
            charset: UTF_8,
            has_bom: false,
        }
    }

    /// 編碼的正式名稱，例如 "UTF-8" 或 "windows-1252"。 / Canonical name, e.g. "UTF-8" or "windows-1252".
    pub fn name(&self) -> &'static str {
        self.charset.name()
    }

    /// 指出位元組串流是否以 BOM 開頭。 / Whether the byte stream starts with a BOM.
    pub fn has_bom(&self) -> bool {
        self.has_bom
    }

    /// 先依 BOM 判斷，其次嘗試 UTF-8，最後以字元集偵測回退。 / BOM first, strict UTF-8 second, charset sniffing last.
    fn sniff_and_decode(bytes: &[u8]) -> Result<(String, TextEncoding), DocumentError> {
        if let Some((charset, bom_len)) = RsEncoding::for_bom(bytes) {
            let payload = &bytes[bom_len..];
            let text = if charset == UTF_8 {
                std::str::from_utf8(payload)
                    .map_err(|_| DocumentError::InvalidEncoding)?
                    .to_owned()
            } else {
                decode_with(charset, payload)?
            };
            return Ok((
                text,
                TextEncoding {
                    charset,
                    has_bom: true,
                },
            ));
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok((text.to_owned(), TextEncoding::utf8()));
        }

        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        let charset = detector.guess(None, true);
        let text = decode_with(charset, bytes)?;
        Ok((
            text,
            TextEncoding {
                charset,
                has_bom: false,
            },
        ))
    }

    /// 將文字依載入時的編碼重新序列化。 / Re-serialises text in the encoding captured at load time.
    fn encode(&self, text: &str) -> Result<Vec<u8>, DocumentError> {
        if self.charset == UTF_8 {
            let mut buffer = Vec::with_capacity(text.len() + 3);
            if self.has_bom {
                buffer.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
            }
            buffer.extend_from_slice(text.as_bytes());
            return Ok(buffer);
        }

        if self.charset == UTF_16LE || self.charset == UTF_16BE {
            return Ok(encode_utf16(text, self.has_bom, self.charset == UTF_16BE));
        }

        let (cow, _, had_errors) = self.charset.encode(text);
        if had_errors {
            return Err(DocumentError::Unrepresentable(self.charset.name()));
        }
        Ok(match cow {
            Cow::Borrowed(slice) => slice.to_vec(),
            Cow::Owned(vec) => vec,
        })
    }
}

/// 文件載入或儲存時可能發生的錯誤。 / Errors that can occur while loading or saving a document.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("file encoding is not supported or data is invalid")]
    InvalidEncoding,
    #[error("text cannot be represented in target encoding {0}")]
    Unrepresentable(&'static str),
}

/// 編輯器背後的記憶體文件模型：整份純文字加上路徑與編碼中繼資料。
/// / In-memory document model backing the editor: one opaque text buffer plus path and encoding metadata.
#[derive(Debug, Clone)]
pub struct Document {
    path: Option<PathBuf>,
    contents: String,
    line_ending: LineEnding,
    encoding: TextEncoding,
    is_dirty: bool,
}

impl Document {
    /// 建立一個空內容且尚未儲存的文件。 / Creates an unsaved document with empty contents.
    pub fn new() -> Self {
        Self {
            path: None,
            contents: String::new(),
            line_ending: LineEnding::Lf,
            encoding: TextEncoding::utf8(),
            is_dirty: false,
        }
    }

    /// 從磁碟載入文件並將行尾內部正規化為 `\n`。 / Loads a document from disk, normalising newlines to `\n` internally.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path_ref = path.as_ref();
        let mut file = File::open(path_ref)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (decoded, encoding) = TextEncoding::sniff_and_decode(&bytes)?;
        let line_ending = detect_line_ending(&decoded);
        let contents = normalize_newlines(&decoded);

        Ok(Self {
            path: Some(path_ref.to_path_buf()),
            contents,
            line_ending,
            encoding,
            is_dirty: false,
        })
    }

    /// 將文件另存為指定路徑，還原載入時的編碼與行尾。
    /// / Saves the document to the given path, reproducing the encoding and line endings captured at load time.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), DocumentError> {
        let path_ref = path.as_ref();
        let serialised = self.contents.replace('\n', self.line_ending.as_str());
        let encoded = self.encoding.encode(&serialised)?;

        // 先寫入暫存檔再重新命名，避免出現部分寫入的情況。 / Temp file plus rename guards against partial writes.
        let tmp_path = path_ref.with_extension("tmp_scriptpad");
        {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(&encoded)?;
            tmp_file.sync_all()?;
        }
        fs::rename(&tmp_path, path_ref)?;

        self.path = Some(path_ref.to_path_buf());
        self.is_dirty = false;
        Ok(())
    }

    /// 取得目前文件內容（行尾已正規化為 `\n`）。 / Returns the current contents, normalised to `\n` line endings.
    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// 提供可變借用給編輯器元件；直接修改不會更新 dirty 旗標，呼叫端需自行標記。
    /// / Mutable borrow for the editor widget; direct edits do not touch the dirty flag, callers mark it themselves.
    pub fn contents_mut(&mut self) -> &mut String {
        &mut self.contents
    }

    /// 以新文字取代記憶體內容並標記文件為已修改。 / Replaces the in-memory contents, marking the document as dirty.
    pub fn set_contents(&mut self, text: impl Into<String>) {
        self.contents = normalize_newlines(&text.into());
        self.is_dirty = true;
    }

    /// 判斷文件是否仍有未儲存變更。 / Returns whether the document has unsaved changes.
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// 將文件標記為已修改。 / Marks the document as having unsaved changes.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// 取得文件所屬的檔案路徑（若存在）。 / Retrieves the associated path if the document is linked to one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 取得顯示用的檔案名稱。 / File name for display purposes.
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
    }

    /// 取得目前行尾設定。 / Returns the current line ending preference.
    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// 取得目前文件編碼。 / Returns the current document encoding.
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// 狀態列使用的行數統計，空文件視為一行。 / Line count for the status bar, an empty buffer counts as one line.
    pub fn line_count(&self) -> usize {
        self.contents.split('\n').count()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_with(charset: &'static RsEncoding, bytes: &[u8]) -> Result<String, DocumentError> {
    let (cow, had_errors) = charset.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(DocumentError::InvalidEncoding);
    }
    Ok(cow.into_owned())
}

fn encode_utf16(text: &str, include_bom: bool, big_endian: bool) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(text.len() * 2 + 2);
    if include_bom {
        buffer.extend_from_slice(if big_endian { b"\xFE\xFF" } else { b"\xFF\xFE" });
    }
    for unit in text.encode_utf16() {
        let bytes = if big_endian {
            unit.to_be_bytes()
        } else {
            unit.to_le_bytes()
        };
        buffer.extend_from_slice(&bytes);
    }
    buffer
}

/// 掃描原始文字找到第一個換行記號以推斷行尾偏好。 / Scans for the first newline sentinel to infer the line ending preference.
fn detect_line_ending(text: &str) -> LineEnding {
    let bytes = text.as_bytes();
    for (idx, byte) in bytes.iter().copied().enumerate() {
        match byte {
            b'\r' => {
                if bytes.get(idx + 1) == Some(&b'\n') {
                    return LineEnding::CrLf;
                }
                return LineEnding::Cr;
            }
            b'\n' => return LineEnding::Lf,
            _ => {}
        }
    }
    LineEnding::Lf
}

fn normalize_newlines(input: &str) -> String {
    if !input.contains('\r') {
        return input.to_owned();
    }
    input.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{GBK, WINDOWS_1252};
    use std::fs;

    fn write_bytes(path: &Path, bytes: &[u8]) {
        fs::write(path, bytes).expect("failed to seed test file");
    }

    #[test]
    fn new_yields_empty_buffer() {
        let doc = Document::new();
        assert_eq!(doc.contents(), "");
        assert!(doc.path().is_none());
        assert!(!doc.is_dirty());
        assert_eq!(doc.line_count(), 1);
    }

    #[test]
    fn open_normalises_crlf_and_detects_line_ending() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("sample.py");
        write_bytes(&file_path, b"print(1)\r\nprint(2)\r\n");

        let doc = Document::open(&file_path).unwrap();
        assert_eq!(doc.contents(), "print(1)\nprint(2)\n");
        assert_eq!(doc.line_ending(), LineEnding::CrLf);
        assert_eq!(doc.encoding().name(), "UTF-8");
        assert!(!doc.is_dirty());
    }

    #[test]
    fn open_save_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.py");
        let target = dir.path().join("output.py");
        let payload = b"import turtle\r\n\r\nturtle.forward(100)\r\n";
        write_bytes(&source, payload);

        let mut doc = Document::open(&source).unwrap();
        doc.save_as(&target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), payload);
        assert_eq!(doc.path(), Some(target.as_path()));
    }

    #[test]
    fn round_trips_utf8_bom() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bom.py");
        let target = dir.path().join("bom-out.py");
        let payload = b"\xEF\xBB\xBFprint('hi')\n";
        write_bytes(&source, payload);

        let mut doc = Document::open(&source).unwrap();
        assert_eq!(doc.contents(), "print('hi')\n");
        assert!(doc.encoding().has_bom());

        doc.save_as(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), payload);
    }

    #[test]
    fn round_trips_utf16_le_bom() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("utf16.py");
        let target = dir.path().join("utf16-out.py");
        // BOM 加上字串 "hi\r\n!"。 / BOM plus the literal "hi\r\n!".
        let payload: &[u8] = b"\xFF\xFEh\x00i\x00\r\x00\n\x00!\x00";
        write_bytes(&source, payload);

        let mut doc = Document::open(&source).unwrap();
        assert_eq!(doc.contents(), "hi\n!");
        assert_eq!(doc.line_ending(), LineEnding::CrLf);
        assert_eq!(doc.encoding().name(), "UTF-16LE");

        doc.save_as(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), payload);
    }

    #[test]
    fn round_trips_legacy_gbk() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gbk.py");
        let target = dir.path().join("gbk-out.py");
        let (encoded, _, _) = GBK.encode("print('中文測試')");
        write_bytes(&source, encoded.as_ref());

        let mut doc = Document::open(&source).unwrap();
        assert_eq!(doc.contents(), "print('中文測試')");
        assert_eq!(doc.encoding().name(), "GBK");

        doc.save_as(&target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), encoded.as_ref());
    }

    #[test]
    fn save_rejects_unrepresentable_characters() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("latin1.py");
        let target = dir.path().join("latin1-out.py");
        let (encoded, _, _) = WINDOWS_1252.encode("café au lait, naïve façade");
        write_bytes(&source, encoded.as_ref());

        let mut doc = Document::open(&source).unwrap();
        assert_eq!(doc.encoding().name(), "windows-1252");

        doc.set_contents("漢");
        let err = doc.save_as(&target).unwrap_err();
        assert!(matches!(err, DocumentError::Unrepresentable("windows-1252")));
    }

    #[test]
    fn save_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("overwrite.py");
        write_bytes(&file_path, b"old contents");

        let mut doc = Document::open(&file_path).unwrap();
        doc.set_contents("new\ncontents\n");
        doc.save_as(&file_path).unwrap();

        assert_eq!(
            fs::read_to_string(&file_path).unwrap(),
            "new\ncontents\n"
        );
        assert!(!doc.is_dirty());
    }

    #[test]
    fn set_contents_marks_dirty_and_save_resets_it() {
        let mut doc = Document::new();
        doc.set_contents("x = 1");
        assert!(doc.is_dirty());

        let dir = tempfile::tempdir().unwrap();
        doc.save_as(dir.path().join("dirty.py")).unwrap();
        assert!(!doc.is_dirty());
    }

    #[test]
    fn open_missing_file_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Document::open(dir.path().join("missing.py")).unwrap_err();
        assert!(matches!(err, DocumentError::Io(_)));
    }
}
