//! CSV backup of vault items.
//!
//! Columns: `type,name,username,password,url,extra`, where `extra` carries
//! the note body or the card number. Import is keyed by header name, so
//! files from other managers with a subset of the columns also load.

use csv::{ReaderBuilder, Terminator, WriterBuilder};

use super::error::{VaultError, VaultResult};
use super::item::{new_id, site_for, ItemKind, VaultItem};

const HEADER: [&str; 6] = ["type", "name", "username", "password", "url", "extra"];

pub fn export_csv(items: &[VaultItem]) -> VaultResult<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(HEADER).map_err(csv_error)?;
    for item in items {
        let extra = item
            .note_content
            .as_deref()
            .or(item.card_number.as_deref())
            .unwrap_or_default();
        writer
            .write_record([
                item.effective_kind().to_string().as_str(),
                item.name.as_deref().unwrap_or_default(),
                item.username.as_deref().unwrap_or_default(),
                item.password.as_deref().unwrap_or_default(),
                item.url.as_deref().unwrap_or_default(),
                extra,
            ])
            .map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| VaultError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| VaultError::Corrupted(e.to_string()))
}

/// Parse a backup into new items with fresh ids. Rows without a name are
/// skipped.
pub fn import_csv(text: &str) -> VaultResult<Vec<VaultItem>> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_matches('"').eq_ignore_ascii_case(name))
    };
    let (type_col, name_col, user_col, pass_col, url_col, extra_col) = (
        column("type"),
        column("name"),
        column("username"),
        column("password"),
        column("url"),
        column("extra"),
    );

    let mut items = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let field = |col: Option<usize>| col.and_then(|i| record.get(i)).unwrap_or_default();

        let name = field(name_col).to_string();
        if name.is_empty() {
            continue;
        }
        let kind = match field(type_col).trim() {
            "" => ItemKind::Login,
            raw => ItemKind::from(raw.to_string()),
        };
        let url = field(url_col).to_string();
        let site = if url.is_empty() {
            name.clone()
        } else {
            site_for(&url, &name)
        };

        let mut item = VaultItem {
            id: Some(new_id()),
            kind: Some(kind),
            name: Some(name),
            username: Some(field(user_col).to_string()),
            password: Some(field(pass_col).to_string()),
            url: Some(url),
            site: Some(site),
            ..VaultItem::default()
        };
        let extra = field(extra_col);
        if !extra.is_empty() {
            match item.effective_kind() {
                ItemKind::Note => item.note_content = Some(extra.to_string()),
                ItemKind::Card => item.card_number = Some(extra.to_string()),
                _ => {}
            }
        }
        items.push(item);
    }
    Ok(items)
}

fn csv_error(e: csv::Error) -> VaultError {
    VaultError::Corrupted(format!("invalid CSV: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_quotes_and_extra_column() {
        let items = vec![
            VaultItem::login("Mail, work", "alice", "p\"w", "https://mail.example.com"),
            VaultItem::note("Wifi", "line one\nline two"),
        ];
        let csv = export_csv(&items).unwrap();
        let mut lines = csv.split("\r\n");
        assert_eq!(lines.next(), Some("type,name,username,password,url,extra"));
        assert_eq!(
            lines.next(),
            Some("login,\"Mail, work\",alice,\"p\"\"w\",https://mail.example.com,")
        );
        assert!(csv.contains("\"line one\nline two\""));
    }

    #[test]
    fn test_import_reads_export() {
        let items = vec![VaultItem::login(
            "GitHub",
            "octo",
            "s3cret,!",
            "https://www.github.com/login",
        )];
        let imported = import_csv(&export_csv(&items).unwrap()).unwrap();
        assert_eq!(imported.len(), 1);
        let item = &imported[0];
        assert_eq!(item.kind, Some(ItemKind::Login));
        assert_eq!(item.password.as_deref(), Some("s3cret,!"));
        assert_eq!(item.site.as_deref(), Some("github.com"));
        assert_ne!(item.id, items[0].id);
    }

    #[test]
    fn test_import_by_header_name_and_skips_unnamed() {
        let text = "URL,Name,Password\nhttps://a.example,A,pw\nhttps://b.example,,pw\n";
        let imported = import_csv(text).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].name.as_deref(), Some("A"));
        assert_eq!(imported[0].username.as_deref(), Some(""));
        assert_eq!(imported[0].site.as_deref(), Some("a.example"));
    }

    #[test]
    fn test_import_restores_note_body() {
        let items = vec![VaultItem::note("Wifi", "line one\nline two")];
        let imported = import_csv(&export_csv(&items).unwrap()).unwrap();
        assert_eq!(imported[0].kind, Some(ItemKind::Note));
        assert_eq!(
            imported[0].note_content.as_deref(),
            Some("line one\nline two")
        );
    }

    #[test]
    fn test_import_keeps_type_as_written() {
        let text = "type,name,extra\nNote,Alarm code,1234\n";
        let imported = import_csv(text).unwrap();
        assert_eq!(imported[0].kind, Some(ItemKind::Other("Note".into())));
        assert_eq!(imported[0].effective_kind(), ItemKind::Note);
        assert_eq!(imported[0].note_content.as_deref(), Some("1234"));
    }

    #[test]
    fn test_import_empty_file() {
        assert!(import_csv("").unwrap().is_empty());
    }
}
