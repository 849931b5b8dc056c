pub mod generate;
pub mod parse;

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::{self, FromStr};

use flate2::bufread::GzDecoder;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use xz::bufread::XzDecoder;

use crate::errors::{Error, Result};

pub use self::generate::{generate_changeset_xml, osmchange_delete, osmchange_init, ToOsmXml};
pub use self::parse::{parse_osm, parse_osm_file};

/// Opens an XML file for reading. Files ending in `.gz` or `.xz` are
/// decompressed on the fly.
pub(crate) fn open_reader(path: &Path) -> Result<Reader<Box<dyn BufRead>>> {
    let file = BufReader::new(fs::File::open(path)?);
    let input: Box<dyn BufRead> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Box::new(BufReader::new(GzDecoder::new(file))),
        Some("xz") => Box::new(BufReader::new(XzDecoder::new(file))),
        _ => Box::new(file),
    };
    Ok(create_reader(input))
}

pub(crate) fn create_reader<R: BufRead>(input: R) -> Reader<R> {
    let mut reader = Reader::from_reader(input);
    reader.trim_text(true);
    reader
}

/// Unescaped value of every attribute of `element`, in document order.
pub(crate) fn attributes(element: &BytesStart) -> Result<Vec<(Vec<u8>, String)>> {
    let mut result = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute?;
        let value = attribute.unescape_value()?.into_owned();
        result.push((attribute.key.as_ref().to_vec(), value));
    }
    Ok(result)
}

pub(crate) fn attribute(element: &BytesStart, name: &[u8]) -> Result<Option<String>> {
    match element.try_get_attribute(name)? {
        Some(attribute) => Ok(Some(attribute.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

/// Parses an attribute value, failing with a message that names the
/// attribute.
pub(crate) fn parse_value<T: FromStr>(name: &[u8], value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::format(format!(
            "invalid value {:?} for attribute {}",
            value,
            String::from_utf8_lossy(name)
        ))
    })
}

pub(crate) fn element_name(element: &BytesStart) -> Result<String> {
    Ok(str::from_utf8(element.name().as_ref())?.to_string())
}

/// Writer producing two space indented UTF-8 XML with a declaration.
pub(crate) fn create_writer() -> Result<Writer<Vec<u8>>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(writer)
}

pub(crate) fn finish_writer(writer: Writer<Vec<u8>>) -> Result<String> {
    let mut text = String::from_utf8(writer.into_inner())
        .map_err(|err| Error::format(err.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Latitudes and longitudes are written with 7 decimals, the precision of
/// the OSM database.
pub(crate) fn format_coordinate(value: f64) -> String {
    format!("{value:.7}")
}
