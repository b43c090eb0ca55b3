use lopdf::{dictionary, Dictionary, Object};

/// Advance widths (1/1000 em) of Helvetica-Bold for printable ASCII,
/// from the Adobe core font metrics.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, // 'a'..'m'
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, // 'n'..'z'
    389, 280, 389, 584, // '{'..'~'
];

/// The base-14 fonts used for signature text. Viewers supply these, so
/// nothing is embedded beyond the font dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    pub fn base_font(self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
        }
    }

    pub fn dictionary(self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => Object::Name(self.base_font().as_bytes().to_vec()),
            "Encoding" => "WinAnsiEncoding",
        }
    }

    /// Width of `text` at `font_size`, or `None` when a glyph has no
    /// metrics available.
    pub fn measure(self, text: &str, font_size: f32) -> Option<f32> {
        let table = match self {
            Self::HelveticaBold => &HELVETICA_BOLD_WIDTHS,
            Self::Helvetica => return None,
        };

        let units = text.chars().try_fold(0u32, |total, ch| {
            let index = (ch as u32).checked_sub(0x20)? as usize;
            table.get(index).map(|width| total + u32::from(*width))
        })?;

        Some(units as f32 * font_size / 1000.0)
    }

    /// First character of `text` this font has no metrics for.
    pub fn first_unmeasurable(self, text: &str) -> Option<char> {
        text.chars().find(|ch| self.measure(ch.encode_utf8(&mut [0; 4]), 1.0).is_none())
    }
}

/// Encodes `text` for a WinAnsi simple font. Characters outside Latin-1 are
/// replaced with `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch as u32 {
            0x20..=0x7e | 0xa0..=0xff => ch as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_ascii_with_bold_metrics() {
        let width = StandardFont::HelveticaBold.measure("Ab", 10.0).expect("ascii is measurable");
        assert!((width - (7.22 + 6.11)).abs() < 1e-4);
    }

    #[test]
    fn non_ascii_is_not_measurable() {
        assert_eq!(StandardFont::HelveticaBold.measure("Zoë", 12.0), None);
        assert_eq!(StandardFont::HelveticaBold.first_unmeasurable("Zoë"), Some('ë'));
        assert_eq!(StandardFont::HelveticaBold.first_unmeasurable("Zoe"), None);
    }

    #[test]
    fn regular_helvetica_has_no_metrics() {
        assert_eq!(StandardFont::Helvetica.measure("a", 12.0), None);
    }

    #[test]
    fn win_ansi_keeps_latin1_and_replaces_the_rest() {
        assert_eq!(encode_win_ansi("Zoë"), vec![b'Z', b'o', 0xeb]);
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }
}
