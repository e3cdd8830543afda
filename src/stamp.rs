use crate::canvas::{Command, OverlayDocument, OverlayPage};
use crate::error::OverprintError;
use crate::fetch::{ImageKind, sniff_image};
use crate::types::Size;
use lopdf::{
    Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, Stream as LoStream,
    dictionary,
};
use std::collections::{BTreeMap, BTreeSet};

/// Resource names injected into template pages. Prefixed so they cannot
/// collide with whatever names the template already uses.
const FONT_BODY_RES: &str = "OvpF1";
const FONT_BOLD_RES: &str = "OvpF2";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateInfo {
    pub page_size: Size,
    pub page_count: usize,
}

#[derive(Debug, Clone)]
pub struct StampedReport {
    pub pdf: Vec<u8>,
    pub pages_stamped: usize,
    pub images_embedded: usize,
}

fn lopdf_err(err: lopdf::Error) -> OverprintError {
    OverprintError::Template(format!("pdf error: {err}"))
}

fn box_coordinate(object: &LoObject) -> f32 {
    match object {
        LoObject::Integer(v) => *v as f32,
        LoObject::Real(v) => *v,
        _ => 0.0,
    }
}

fn page_box(page: &lopdf::Dictionary) -> Vec<LoObject> {
    if let Ok(arr) = page.get(b"CropBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    if let Ok(arr) = page.get(b"MediaBox").and_then(LoObject::as_array) {
        return arr.clone();
    }
    vec![0.into(), 0.into(), 612.into(), 792.into()]
}

fn page_resources_dict(page: &lopdf::Dictionary, doc: &LoDocument) -> lopdf::Dictionary {
    match page.get(b"Resources") {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

fn resource_sub_dict(
    resources: &lopdf::Dictionary,
    key: &[u8],
    doc: &LoDocument,
) -> lopdf::Dictionary {
    match resources.get(key) {
        Ok(LoObject::Dictionary(d)) => d.clone(),
        Ok(LoObject::Reference(id)) => doc
            .get_object(*id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .cloned()
            .unwrap_or_default(),
        _ => lopdf::Dictionary::new(),
    }
}

/// Reads page geometry and count without mutating the template.
pub fn inspect_template(template_bytes: &[u8]) -> Result<TemplateInfo, OverprintError> {
    let doc = LoDocument::load_mem(template_bytes).map_err(lopdf_err)?;
    if doc.is_encrypted() {
        return Err(OverprintError::Template(
            "template PDF is encrypted".to_string(),
        ));
    }
    let pages = doc.get_pages();
    let page_count = pages.len();
    let first_page_id = pages.values().next().copied().ok_or_else(|| {
        OverprintError::Template("template PDF has no pages".to_string())
    })?;
    let page = doc
        .get_object(first_page_id)
        .and_then(LoObject::as_dict)
        .map_err(lopdf_err)?;
    let bbox = page_box(page);
    let (width, height) = if bbox.len() == 4 {
        (
            box_coordinate(&bbox[2]) - box_coordinate(&bbox[0]),
            box_coordinate(&bbox[3]) - box_coordinate(&bbox[1]),
        )
    } else {
        (612.0, 792.0)
    };
    Ok(TemplateInfo {
        page_size: Size::from_f32(width, height),
        page_count,
    })
}

fn font_resource(font_name: &str) -> &'static str {
    if font_name.eq_ignore_ascii_case("Helvetica-Bold") {
        FONT_BOLD_RES
    } else {
        FONT_BODY_RES
    }
}

/// Escapes a string for a PDF literal string in a Type1 standard font.
/// Typographic characters outside WinAnsi's comfortable range fold to ASCII
/// approximations; anything else unmappable becomes `?`.
fn pdf_escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\u{2018}' | '\u{2019}' | '\u{02bc}' => out.push('\''),
            '\u{201c}' | '\u{201d}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2022}' => out.push('*'),
            '\u{00a0}' => out.push(' '),
            c if c.is_control() => out.push(' '),
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

struct EmbeddedImage {
    object_id: LoObjectId,
}

fn embed_image(
    doc: &mut LoDocument,
    bytes: &[u8],
) -> Result<Option<EmbeddedImage>, OverprintError> {
    let Some(kind) = sniff_image(bytes) else {
        return Ok(None);
    };
    match kind {
        ImageKind::Jpeg => {
            // JPEG passes through untouched under DCTDecode.
            let decoded = image::load_from_memory(bytes)
                .map_err(|e| OverprintError::Template(format!("bad jpeg: {e}")))?;
            let stream = LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => decoded.width() as i64,
                    "Height" => decoded.height() as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                bytes.to_vec(),
            )
            .with_compression(false);
            Ok(Some(EmbeddedImage {
                object_id: doc.add_object(stream),
            }))
        }
        ImageKind::Png => {
            // PNG decodes to raw samples: RGB in the image stream, alpha as
            // a soft mask so transparent chart backgrounds survive.
            let decoded = image::load_from_memory(bytes)
                .map_err(|e| OverprintError::Template(format!("bad png: {e}")))?
                .to_rgba8();
            let (width, height) = decoded.dimensions();
            let mut rgb = Vec::with_capacity((width * height * 3) as usize);
            let mut alpha = Vec::with_capacity((width * height) as usize);
            for pixel in decoded.pixels() {
                rgb.extend_from_slice(&pixel.0[..3]);
                alpha.push(pixel.0[3]);
            }
            let smask_id = doc.add_object(LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            ));
            let stream = LoStream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width as i64,
                    "Height" => height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "SMask" => LoObject::Reference(smask_id),
                },
                rgb,
            );
            Ok(Some(EmbeddedImage {
                object_id: doc.add_object(stream),
            }))
        }
    }
}

/// Serializes one overlay page into a content stream fragment, returning the
/// stream and the image resource ids it references. `None` when the page has
/// nothing visible to draw.
fn serialize_page(page: &OverlayPage, embedded: &BTreeMap<String, EmbeddedImage>) -> Option<(Vec<u8>, BTreeSet<String>)> {
    let mut out = String::from("q\n");
    let mut used_images = BTreeSet::new();
    let mut font_name = "Helvetica".to_string();
    let mut font_size = 12.0f32;
    let mut drew = false;

    for command in &page.commands {
        match command {
            Command::SetFillColor(color) => {
                out.push_str(&format!(
                    "{:.3} {:.3} {:.3} rg\n",
                    color.r, color.g, color.b,
                ));
            }
            Command::SetFontName(name) => font_name = name.clone(),
            Command::SetFontSize(size) => font_size = size.to_f32(),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{:.2} {:.2} {:.2} {:.2} re\n",
                    x.to_f32(),
                    y.to_f32(),
                    width.to_f32(),
                    height.to_f32(),
                ));
            }
            Command::Fill => {
                out.push_str("f\n");
                drew = true;
            }
            Command::DrawString { x, y, text } => {
                out.push_str(&format!(
                    "BT /{} {:.2} Tf {:.2} {:.2} Td ({}) Tj ET\n",
                    font_resource(&font_name),
                    font_size,
                    x.to_f32(),
                    y.to_f32(),
                    pdf_escape_text(text),
                ));
                drew = true;
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if !embedded.contains_key(resource_id) {
                    continue;
                }
                out.push_str(&format!(
                    "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /{} Do Q\n",
                    width.to_f32(),
                    height.to_f32(),
                    x.to_f32(),
                    y.to_f32(),
                    resource_id,
                ));
                used_images.insert(resource_id.clone());
                drew = true;
            }
        }
    }
    if !drew {
        return None;
    }
    out.push_str("Q\n");
    Some((out.into_bytes(), used_images))
}

/// Stamps the recorded overlay onto the template, page index to page index.
/// Overlay pages beyond the template's page count are dropped. The template's
/// own content is never altered; the overlay lands on top of it.
pub fn stamp_report(
    template_bytes: &[u8],
    overlay: &OverlayDocument,
) -> Result<StampedReport, OverprintError> {
    let mut doc = LoDocument::load_mem(template_bytes).map_err(lopdf_err)?;
    if doc.is_encrypted() {
        return Err(OverprintError::Template(
            "template PDF is encrypted".to_string(),
        ));
    }

    let body_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });

    let mut embedded: BTreeMap<String, EmbeddedImage> = BTreeMap::new();
    for (resource_id, bytes) in &overlay.images {
        if let Some(image) = embed_image(&mut doc, bytes)? {
            embedded.insert(resource_id.clone(), image);
        }
    }
    let images_embedded = embedded.len();

    let page_ids: Vec<LoObjectId> = doc.get_pages().values().copied().collect();
    let mut pages_stamped = 0;

    for (index, overlay_page) in overlay.pages.iter().enumerate() {
        let Some(page_id) = page_ids.get(index).copied() else {
            break;
        };
        let Some((content, used_images)) = serialize_page(overlay_page, &embedded) else {
            continue;
        };

        let page_dict = doc
            .get_object(page_id)
            .and_then(LoObject::as_dict)
            .map_err(lopdf_err)?
            .clone();
        let mut resources = page_resources_dict(&page_dict, &doc);

        let mut fonts = resource_sub_dict(&resources, b"Font", &doc);
        fonts.set(FONT_BODY_RES, LoObject::Reference(body_font_id));
        fonts.set(FONT_BOLD_RES, LoObject::Reference(bold_font_id));
        resources.set("Font", LoObject::Dictionary(fonts));

        if !used_images.is_empty() {
            let mut xobjects = resource_sub_dict(&resources, b"XObject", &doc);
            for resource_id in &used_images {
                if let Some(image) = embedded.get(resource_id) {
                    xobjects.set(
                        resource_id.as_bytes().to_vec(),
                        LoObject::Reference(image.object_id),
                    );
                }
            }
            resources.set("XObject", LoObject::Dictionary(xobjects));
        }

        {
            let page_mut = doc
                .get_object_mut(page_id)
                .and_then(LoObject::as_dict_mut)
                .map_err(lopdf_err)?;
            page_mut.set("Resources", LoObject::Dictionary(resources));
        }

        doc.add_page_contents(page_id, content).map_err(lopdf_err)?;
        pages_stamped += 1;
    }

    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf)?;

    Ok(StampedReport {
        pdf,
        pages_stamped,
        images_embedded,
    })
}
