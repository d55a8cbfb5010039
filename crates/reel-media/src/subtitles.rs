//! ASS (Advanced SubStation Alpha) subtitle files for burning into video.

use std::path::Path;

/// Entry effect applied to every cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueAnimation {
    /// Starts slightly enlarged and settles
    Pop,
    Fade,
    /// Starts blurred and sharpens
    Glow,
    /// Grows from 80% to full size
    Scale,
}

impl CueAnimation {
    /// Override tags prepended to the cue text.
    pub fn tags(&self) -> &'static str {
        match self {
            CueAnimation::Pop => r"{\fscx110\fscy110\t(0,100,\fscx100\fscy100)}",
            CueAnimation::Fade => r"{\alpha&HFF&\t(0,200,\alpha&H00&)}",
            CueAnimation::Glow => r"{\blur5\t(0,300,\blur0)}",
            CueAnimation::Scale => r"{\fscx80\fscy80\t(0,150,\fscx100\fscy100)}",
        }
    }
}

/// Style configuration for ASS subtitles. Colors are `#RRGGBB`.
#[derive(Debug, Clone, PartialEq)]
pub struct AssStyle {
    pub font_name: String,
    /// Font size at a 1080 pixel wide frame
    pub font_size: u32,
    pub primary_color: String,
    pub secondary_color: String,
    pub outline_color: String,
    pub bold: bool,
    /// Outline width in pixels
    pub outline: u32,
    /// Shadow depth in pixels
    pub shadow: u32,
    /// Alignment (numpad layout: 1-3=bottom, 4-6=mid, 7-9=top)
    pub alignment: u8,
    pub margin_v: u32,
    pub animation: CueAnimation,
}

impl AssStyle {
    fn style_line(&self, play_res: (u32, u32)) -> String {
        // Scale with the frame so landscape and portrait read alike.
        let font_size = (self.font_size as u64 * play_res.0.min(play_res.1) as u64 / 1080).max(1);
        format!(
            "Style: Default,{font},{size},{primary},{secondary},{outline},&H80000000,{bold},0,0,0,100,100,0,0,1,{outline_w},{shadow},{align},40,40,{mv},1",
            font = self.font_name,
            size = font_size,
            primary = ass_color(&self.primary_color),
            secondary = ass_color(&self.secondary_color),
            outline = ass_color(&self.outline_color),
            bold = if self.bold { -1 } else { 0 },
            outline_w = self.outline,
            shadow = self.shadow,
            align = self.alignment,
            mv = self.margin_v,
        )
    }
}

/// One line of text shown from `start` to `end` seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// `#RRGGBB` as an opaque ASS `&HAABBGGRR` color. Malformed input is white.
pub fn ass_color(rgb: &str) -> String {
    let hex = rgb.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return "&H00FFFFFF".to_string();
    }
    let hex = hex.to_ascii_uppercase();
    format!("&H00{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2])
}

/// `H:MM:SS.CC`, rounded to the nearest centisecond.
pub fn format_ass_timestamp(secs: f64) -> String {
    let total = (secs.max(0.0) * 100.0).round() as u64;
    let (hours, rest) = (total / 360_000, total % 360_000);
    let (minutes, rest) = (rest / 6_000, rest % 6_000);
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, rest / 100, rest % 100)
}

/// Escape special characters in ASS text.
pub fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

/// Escape a path for use inside a quoted filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
}

/// Complete ASS file for `cues` rendered at `play_res`.
pub fn generate_ass(cues: &[Cue], style: &AssStyle, play_res: (u32, u32)) -> String {
    let mut output = String::new();

    output.push_str("[Script Info]\n");
    output.push_str("ScriptType: v4.00+\n");
    output.push_str(&format!("PlayResX: {}\n", play_res.0));
    output.push_str(&format!("PlayResY: {}\n", play_res.1));
    output.push_str("WrapStyle: 0\n");
    output.push_str("ScaledBorderAndShadow: yes\n\n");

    output.push_str("[V4+ Styles]\n");
    output.push_str("Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n");
    output.push_str(&style.style_line(play_res));
    output.push_str("\n\n");

    output.push_str("[Events]\n");
    output.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for cue in cues.iter().filter(|cue| cue.end > cue.start) {
        output.push_str(&format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{}{}\n",
            format_ass_timestamp(cue.start),
            format_ass_timestamp(cue.end),
            style.animation.tags(),
            escape_ass_text(&cue.text)
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style() -> AssStyle {
        AssStyle {
            font_name: "Montserrat".to_string(),
            font_size: 48,
            primary_color: "#FFFF00".to_string(),
            secondary_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            bold: true,
            outline: 4,
            shadow: 2,
            alignment: 5,
            margin_v: 50,
            animation: CueAnimation::Pop,
        }
    }

    #[test]
    fn test_format_ass_timestamp() {
        assert_eq!(format_ass_timestamp(0.0), "0:00:00.00");
        assert_eq!(format_ass_timestamp(1.5), "0:00:01.50");
        assert_eq!(format_ass_timestamp(61.0), "0:01:01.00");
        assert_eq!(format_ass_timestamp(59.999), "0:01:00.00");
        assert_eq!(format_ass_timestamp(3723.456), "1:02:03.46");
    }

    #[test]
    fn test_ass_color_is_bgr() {
        assert_eq!(ass_color("#FFFF00"), "&H0000FFFF");
        assert_eq!(ass_color("00ffff"), "&H00FFFF00");
        assert_eq!(ass_color("yellow"), "&H00FFFFFF");
    }

    #[test]
    fn test_generate_ass() {
        let cues = vec![
            Cue { start: 0.0, end: 1.25, text: "In 1956, ten".to_string() },
            Cue { start: 1.25, end: 1.25, text: "empty".to_string() },
            Cue { start: 1.25, end: 2.5, text: "scientists {met}".to_string() },
        ];
        let ass = generate_ass(&cues, &style(), (1080, 1920));

        assert!(ass.contains("PlayResX: 1080\nPlayResY: 1920"));
        assert!(ass.contains("Style: Default,Montserrat,48,&H0000FFFF,&H00FFFFFF,&H00000000,&H80000000,-1,"));
        let dialogue: Vec<&str> = ass.lines().filter(|l| l.starts_with("Dialogue:")).collect();
        assert_eq!(dialogue.len(), 2);
        assert!(dialogue[0].starts_with("Dialogue: 0,0:00:00.00,0:00:01.25,Default,,0,0,0,,{\\fscx110"));
        assert!(dialogue[1].ends_with("scientists \\{met\\}"));
    }

    #[test]
    fn test_font_scales_with_frame() {
        let ass = generate_ass(&[], &style(), (1920, 1080));
        assert!(ass.contains("Style: Default,Montserrat,48,"));
        let ass = generate_ass(&[], &style(), (540, 960));
        assert!(ass.contains("Style: Default,Montserrat,24,"));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("/work/job's/subs.ass")),
            "/work/job'\\''s/subs.ass"
        );
        assert_eq!(escape_filter_path(Path::new("C:/subs.ass")), "C\\:/subs.ass");
    }
}
