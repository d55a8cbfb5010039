//! Prompt vocabulary shared by the generation stages.

/// Image-prompt phrase for an art style. Unknown styles fall back to photorealism.
pub fn art_style_description(art_style: &str) -> &'static str {
    match art_style.to_lowercase().as_str() {
        "anime" => "anime style, vibrant colors, detailed eyes, Japanese animation aesthetic",
        "ghibli" => "hand-painted animation style, magical atmosphere, soft colors, whimsical",
        "disney" => "3D animation style, expressive characters, vibrant colors, family-friendly",
        "comic" => "comic book style, bold outlines, dynamic composition, halftone dots",
        "watercolor" => "soft watercolor painting, flowing colors, artistic brushstrokes",
        "pixel" => "pixel art, retro gaming aesthetic, 8-bit style, clean pixels",
        "creepy" => "dark and moody, gothic atmosphere, mysterious shadows",
        "expressionism" => "abstract expressionism, bold colors, emotional intensity, artistic brushwork",
        _ => "hyper-realistic 8K photograph, cinematic composition, professional photography",
    }
}

/// Tone description for a narrative style. Unknown styles read as documentary.
pub fn narrative_style_description(style: &str) -> &'static str {
    match style.to_lowercase().as_str() {
        "viral" => "engaging, hook-driven, surprising facts, shareable",
        "storytelling" => "narrative arc, characters, conflict and resolution",
        "motivational" => "inspiring, uplifting, ends with a call to action",
        "educational" => "clear explanations, step by step, teaching style",
        _ => "informative, factual, professional documentary narration",
    }
}

pub fn language_name(code: &str) -> &str {
    match code.to_lowercase().as_str() {
        "en" => "English",
        "ru" => "Russian",
        "kk" => "Kazakh",
        "de" => "German",
        "fr" => "French",
        "es" => "Spanish",
        _ => code,
    }
}
