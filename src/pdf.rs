use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

/// Largest width/height of an image placed on a page.
pub const MAX_PAGE_EDGE: u32 = 800;

pub fn pdf_path(dir: &Path, title: &str) -> PathBuf {
    let slug = crate::capture::slugify(title);
    let name = if slug.is_empty() { "document".to_owned() } else { slug };
    dir.join(format!("{name}.pdf"))
}

/// Writes one page per image, in order, to `out`.
pub fn images_to_pdf(images: &[PathBuf], out: &Path) -> anyhow::Result<()> {
    if images.is_empty() {
        anyhow::bail!("no images to put in {}", out.display());
    }
    tracing::info!(pages = images.len(), out = %out.display(), "creating pdf");

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(images.len());

    for path in images {
        let image = image::open(path).with_context(|| format!("open image: {}", path.display()))?;
        let image = fit_within(image, MAX_PAGE_EDGE);
        let (width, height) = (i64::from(image.width()), i64::from(image.height()));
        let jpeg = encode_jpeg(&image).with_context(|| format!("encode image: {}", path.display()))?;

        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            jpeg,
        ));

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Integer(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().context("encode page content")?,
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(width),
                Object::Integer(height),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(parent) = out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create pdf dir: {}", parent.display()))?;
    }
    doc.save(out)
        .with_context(|| format!("write pdf: {}", out.display()))?;
    tracing::info!(out = %out.display(), "pdf created");
    Ok(())
}

/// Shrinks `image` to fit a `max_edge` square, keeping its aspect ratio. Never enlarges.
fn fit_within(image: DynamicImage, max_edge: u32) -> DynamicImage {
    if image.width() <= max_edge && image.height() <= max_edge {
        return image;
    }
    image.resize(max_edge, max_edge, FilterType::Lanczos3)
}

fn encode_jpeg(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .context("jpeg encode")?;
    Ok(out.into_inner())
}
