//! marcXchange payload handling.
//!
//! The record service returns member documents that are either a bare
//! `<record>` or a `<collection>` of records. Fetch tasks pull the
//! `<record>` elements out of every member and reassemble them into one
//! collection document per envelope. Subject proofing additionally reads
//! a single subfield value out of the anchor record.

use quick_xml::events::Event;
use quick_xml::Reader;

pub const MARCXCHANGE_NS: &str = "info:lc/xmlns/marcxchange-v1";

#[derive(Debug, thiserror::Error)]
#[error("member data cannot be parsed as marcXchange: {0}")]
pub struct MarcError(String);

/// Extract every `<record>` element (verbatim attributes and content)
/// from a marcXchange document.
pub fn extract_records(document: &[u8]) -> Result<Vec<String>, MarcError> {
    let text = std::str::from_utf8(document).map_err(|e| MarcError(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut records = Vec::new();
    loop {
        match reader.read_event() {
            Err(e) => return Err(MarcError(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"record" => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let tag = reconstruct_tag(&e)?;
                let span = reader
                    .read_to_end(e.name())
                    .map_err(|e| MarcError(e.to_string()))?;
                let inner = &text[span.start as usize..span.end as usize];
                records.push(format!("{tag}>{inner}</{name}>"));
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"record" => {
                let tag = reconstruct_tag(&e)?;
                records.push(format!("{tag}/>"));
            }
            Ok(_) => {}
        }
    }
    Ok(records)
}

/// Wrap record elements into one marcXchange collection document.
pub fn assemble_collection(records: &[String]) -> Vec<u8> {
    let mut out = String::with_capacity(
        records.iter().map(String::len).sum::<usize>() + 128,
    );
    out.push_str("<?xml version='1.0' encoding='UTF-8'?>\n");
    out.push_str(&format!("<collection xmlns='{MARCXCHANGE_NS}'>"));
    for record in records {
        out.push_str(record);
    }
    out.push_str("</collection>");
    out.into_bytes()
}

/// First value of `subfield[@code]` inside `datafield[@tag]`, if any.
pub fn subfield_value(
    document: &[u8],
    tag: &str,
    code: &str,
) -> Result<Option<String>, MarcError> {
    let text = std::str::from_utf8(document).map_err(|e| MarcError(e.to_string()))?;
    let mut reader = Reader::from_str(text);
    let mut in_target_field = false;
    let mut in_target_subfield = false;
    loop {
        match reader.read_event() {
            Err(e) => return Err(MarcError(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"datafield" => {
                    in_target_field = attribute_value(&e, b"tag")?.as_deref() == Some(tag);
                }
                b"subfield" if in_target_field => {
                    in_target_subfield = attribute_value(&e, b"code")?.as_deref() == Some(code);
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_target_subfield => {
                let value = t.unescape().map_err(|e| MarcError(e.to_string()))?;
                return Ok(Some(value.into_owned()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"subfield" => in_target_subfield = false,
                b"datafield" => in_target_field = false,
                _ => {}
            },
            Ok(_) => {}
        }
    }
    Ok(None)
}

fn reconstruct_tag(element: &quick_xml::events::BytesStart<'_>) -> Result<String, MarcError> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut tag = format!("<{name}");
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| MarcError(e.to_string()))?;
        tag.push_str(&format!(
            " {}=\"{}\"",
            String::from_utf8_lossy(attribute.key.as_ref()),
            String::from_utf8_lossy(&attribute.value)
        ));
    }
    Ok(tag)
}

fn attribute_value(
    element: &quick_xml::events::BytesStart<'_>,
    name: &[u8],
) -> Result<Option<String>, MarcError> {
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| MarcError(e.to_string()))?;
        if attribute.key.as_ref() == name {
            return Ok(Some(String::from_utf8_lossy(&attribute.value).into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bib: &str, agency: u32) -> String {
        format!(
            "<record><datafield ind1='0' ind2='0' tag='001'>\
             <subfield code='a'>{bib}</subfield>\
             <subfield code='b'>{agency}</subfield>\
             </datafield></record>"
        )
    }

    fn collection(records: &[String]) -> String {
        format!(
            "<?xml version='1.0' encoding='UTF-8'?>\
             <collection xmlns='{MARCXCHANGE_NS}'>{}</collection>",
            records.join("")
        )
    }

    #[test]
    fn test_extract_records_from_collection() {
        let doc = collection(&[record("a1", 870970), record("a2", 870970)]);
        let records = extract_records(doc.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains(">a1<"));
        assert!(records[1].contains(">a2<"));
    }

    #[test]
    fn test_extract_bare_record() {
        let doc = record("x", 191919);
        let records = extract_records(doc.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_extract_self_closing_record() {
        let records =
            extract_records(b"<record xmlns='info:lc/xmlns/marcxchange-v1'/>").unwrap();
        assert_eq!(records, vec!["<record xmlns=\"info:lc/xmlns/marcxchange-v1\"/>"]);
    }

    #[test]
    fn test_plain_text_yields_no_records() {
        let records = extract_records(b"invalidXML").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_truncated_document_is_an_error() {
        assert!(extract_records(b"<collection><record><datafield>").is_err());
    }

    #[test]
    fn test_assemble_collection_wraps_members() {
        let assembled = assemble_collection(&[record("a1", 870970), record("a2", 870971)]);
        let text = String::from_utf8(assembled).unwrap();
        assert!(text.starts_with("<?xml version='1.0' encoding='UTF-8'?>"));
        assert!(text.contains(&format!("<collection xmlns='{MARCXCHANGE_NS}'>")));
        assert_eq!(text.matches("<record>").count(), 2);
        assert!(text.ends_with("</collection>"));
        // The assembled document must itself extract cleanly.
        assert_eq!(extract_records(text.as_bytes()).unwrap().len(), 2);
    }

    #[test]
    fn test_subfield_value_found() {
        let doc = format!(
            "<record><datafield ind1='0' ind2='0' tag='015'>\
             <subfield code='a'>51423999</subfield></datafield>\
             {}</record>",
            "<datafield tag='245'><subfield code='a'>title</subfield></datafield>"
        );
        let value = subfield_value(doc.as_bytes(), "015", "a").unwrap();
        assert_eq!(value.as_deref(), Some("51423999"));
    }

    #[test]
    fn test_subfield_value_wrong_tag_is_none() {
        let doc = record("a1", 870970);
        assert!(subfield_value(doc.as_bytes(), "015", "a").unwrap().is_none());
    }

    #[test]
    fn test_subfield_value_ignores_other_codes() {
        let doc = "<record><datafield tag='015'>\
                   <subfield code='b'>x</subfield>\
                   <subfield code='a'>y</subfield>\
                   </datafield></record>";
        assert_eq!(
            subfield_value(doc.as_bytes(), "015", "a").unwrap().as_deref(),
            Some("y")
        );
    }
}
