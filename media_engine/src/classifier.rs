//! §4.B File Classifier — from bytes and extension, determine exact media
//! type and sub-format. Content wins over extension on disagreement.
//!
//! Magic-byte table generalizes
//! `shared_utils::image_detection::detect_format_from_bytes` /
//! `detect_animation` to the spec's `Classification`, plus adds video/WebM
//! recognition that module doesn't cover (it's image-only).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::types::{Classification, SourceFormat};

const MAX_HEADER: usize = 64 * 1024;

/// Read up to `MAX_HEADER` bytes. A short read (small file) is fine; we
/// work with whatever prefix exists.
fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; MAX_HEADER];
    let mut total = 0;
    loop {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
        if total == buf.len() {
            break;
        }
    }
    buf.truncate(total);
    Ok(buf)
}

fn find_window(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// PNG: scan for an `acTL` chunk before the first `IDAT` to identify APNG.
fn png_has_actl_before_idat(data: &[u8]) -> bool {
    let actl = data.windows(4).position(|w| w == b"acTL");
    let idat = data.windows(4).position(|w| w == b"IDAT");
    match (actl, idat) {
        (Some(a), Some(i)) => a < i,
        (Some(_), None) => true,
        _ => false,
    }
}

/// GIF: count image-descriptor bytes (0x2C) outside of the trailer/extension
/// blocks to distinguish static vs animated. This is a bounded heuristic
/// scan over the already-read prefix, not a full GIF block parser.
fn gif_frame_count_at_least_two(data: &[u8]) -> bool {
    data.iter().filter(|&&b| b == 0x2C).count() >= 2
}

/// WebP: locate `VP8X`; if present, check the animation flag bit (bit 1 of
/// the flags byte) and/or presence of `ANIM`/`ANMF` chunks.
fn webp_is_animated(data: &[u8]) -> bool {
    if find_window(data, b"ANIM") || find_window(data, b"ANMF") {
        return true;
    }
    if let Some(pos) = data.windows(4).position(|w| w == b"VP8X") {
        let flags_offset = pos + 4 + 4; // VP8X chunk-id(4) + chunk-size(4) = flags byte
        if let Some(&flags) = data.get(flags_offset) {
            return flags & 0b0000_0010 != 0;
        }
    }
    false
}

/// ISO-BMFF `ftyp` major brand, used to disambiguate HEIC/AVIF/video.
fn iso_bmff_major_brand(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return None;
    }
    Some(&data[8..12])
}

pub fn classify(path: &Path, _size: u64, declared_ext: &str) -> Classification {
    let data = match read_header(path) {
        Ok(d) => d,
        Err(e) => {
            debug!(?path, error = %e, "unreadable header, classifying as unknown");
            return Classification {
                format: SourceFormat::Unknown,
                is_animated: false,
                is_video: false,
            };
        }
    };

    let classification = classify_bytes(&data);

    if classification.format == SourceFormat::Unknown {
        debug!(?path, declared_ext, "content did not match any known format");
    }

    classification
}

fn classify_bytes(data: &[u8]) -> Classification {
    if data.len() >= 8 && data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        let animated = png_has_actl_before_idat(data);
        return Classification {
            format: if animated {
                SourceFormat::Apng
            } else {
                SourceFormat::Png
            },
            is_animated: animated,
            is_video: false,
        };
    }

    if data.len() >= 3 && data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Classification {
            format: SourceFormat::Jpeg,
            is_animated: false,
            is_video: false,
        };
    }

    if data.len() >= 6 && (data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) {
        let animated = gif_frame_count_at_least_two(data);
        return Classification {
            format: SourceFormat::Gif,
            is_animated: animated,
            is_video: false,
        };
    }

    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        let animated = webp_is_animated(data);
        return Classification {
            format: if animated {
                SourceFormat::WebpAnimated
            } else {
                SourceFormat::WebpStatic
            },
            is_animated: animated,
            is_video: false,
        };
    }

    if let Some(brand) = iso_bmff_major_brand(data) {
        return match brand {
            b"heic" | b"heix" | b"mif1" => Classification {
                format: SourceFormat::Heic,
                is_animated: false,
                is_video: false,
            },
            b"heif" => Classification {
                format: SourceFormat::Heif,
                is_animated: false,
                is_video: false,
            },
            b"avif" => Classification {
                format: SourceFormat::Avif,
                is_animated: false,
                is_video: false,
            },
            b"qt  " => Classification {
                format: SourceFormat::VideoMov,
                is_animated: false,
                is_video: true,
            },
            _ => Classification {
                format: SourceFormat::VideoMp4,
                is_animated: false,
                is_video: true,
            },
        };
    }

    if data.len() >= 2 && data.starts_with(&[0xFF, 0x0A]) {
        return Classification {
            format: SourceFormat::Jxl,
            is_animated: false,
            is_video: false,
        };
    }
    if data.len() >= 8 && data.starts_with(&[0x00, 0x00, 0x00, 0x0C, 0x4A, 0x58, 0x4C, 0x20]) {
        return Classification {
            format: SourceFormat::Jxl,
            is_animated: false,
            is_video: false,
        };
    }

    if data.len() >= 4
        && (data.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]))
    {
        return Classification {
            format: SourceFormat::Tiff,
            is_animated: false,
            is_video: false,
        };
    }

    if data.len() >= 2 && data.starts_with(b"BM") {
        return Classification {
            format: SourceFormat::Bmp,
            is_animated: false,
            is_video: false,
        };
    }

    if data.len() >= 4 && data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Classification {
            format: SourceFormat::VideoWebm,
            is_animated: false,
            is_video: true,
        };
    }

    Classification {
        format: SourceFormat::Unknown,
        is_animated: false,
        is_video: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_magic_classifies_as_png() {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(b"IDAT");
        let c = classify_bytes(&data);
        assert_eq!(c.format, SourceFormat::Png);
        assert!(!c.is_animated);
    }

    #[test]
    fn apng_actl_before_idat_is_animated() {
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(b"acTL");
        data.extend_from_slice(b"IDAT");
        let c = classify_bytes(&data);
        assert_eq!(c.format, SourceFormat::Apng);
        assert!(c.is_animated);
    }

    #[test]
    fn jpeg_magic_classifies_as_jpeg() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(classify_bytes(&data).format, SourceFormat::Jpeg);
    }

    #[test]
    fn webp_static_vs_animated() {
        let mut static_webp = b"RIFF".to_vec();
        static_webp.extend_from_slice(&[0, 0, 0, 0]);
        static_webp.extend_from_slice(b"WEBP");
        static_webp.extend_from_slice(b"VP8 ");
        let c = classify_bytes(&static_webp);
        assert_eq!(c.format, SourceFormat::WebpStatic);

        let mut anim_webp = b"RIFF".to_vec();
        anim_webp.extend_from_slice(&[0, 0, 0, 0]);
        anim_webp.extend_from_slice(b"WEBP");
        anim_webp.extend_from_slice(b"ANIM");
        let c = classify_bytes(&anim_webp);
        assert_eq!(c.format, SourceFormat::WebpAnimated);
        assert!(c.is_animated);
    }

    #[test]
    fn heic_vs_avif_vs_mp4_ftyp_brands() {
        let mk = |brand: &[u8]| {
            let mut d = vec![0u8; 12];
            d[4..8].copy_from_slice(b"ftyp");
            d[8..12].copy_from_slice(brand);
            d
        };
        assert_eq!(classify_bytes(&mk(b"heic")).format, SourceFormat::Heic);
        assert_eq!(classify_bytes(&mk(b"avif")).format, SourceFormat::Avif);
        assert_eq!(classify_bytes(&mk(b"isom")).format, SourceFormat::VideoMp4);
    }

    #[test]
    fn webm_ebml_magic_classifies_as_video() {
        let data = vec![0x1A, 0x45, 0xDF, 0xA3, 0x01];
        let c = classify_bytes(&data);
        assert_eq!(c.format, SourceFormat::VideoWebm);
        assert!(c.is_video);
    }

    #[test]
    fn unknown_bytes_classify_as_unknown() {
        let data = vec![0u8; 16];
        assert_eq!(classify_bytes(&data).format, SourceFormat::Unknown);
    }

    #[test]
    fn gif_static_vs_animated_by_image_descriptor_count() {
        let mut one_frame = b"GIF89a".to_vec();
        one_frame.push(0x2C);
        assert!(!classify_bytes(&one_frame).is_animated);

        let mut two_frames = b"GIF89a".to_vec();
        two_frames.push(0x2C);
        two_frames.push(0x2C);
        assert!(classify_bytes(&two_frames).is_animated);
    }
}
