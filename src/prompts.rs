//! Prompts for card generation and vision extraction.
//!
//! Centralising every prompt here keeps the provider client free of prompt
//! engineering and lets unit tests inspect prompt text without touching a
//! real provider. The card-count range is interpolated from the active
//! [`crate::config::CardCountPolicy`] so the instructions always agree with
//! what the parser will enforce.

use crate::config::CardCountPolicy;

/// Instruction for the vision-extraction pass over an image set.
///
/// The output of this call is *content* — a thorough textual capture of the
/// images — which is then fed to the card-generation call like any other
/// extracted text.
pub const VISION_EXTRACT_PROMPT: &str = "\
Analyze these images and extract ALL educational content, text, and concepts.

Your task:
1. Extract ALL text visible in the images (OCR)
2. Describe diagrams, charts, graphs, and visual elements
3. Identify key concepts, definitions, formulas, and processes
4. Capture any annotations, highlights, or handwritten notes
5. Explain relationships and connections shown in visuals

Provide a COMPREHENSIVE summary that captures EVERYTHING a student needs to \
learn from these images. Be thorough and detailed - don't miss any important \
information.";

/// System prompt for the structured card-generation call.
///
/// The returned text asks for a bare JSON object; the parser still strips
/// code fences defensively because models wrap output in them anyway.
pub fn card_system_prompt(policy: CardCountPolicy) -> String {
    let CardCountPolicy { min, max } = policy;
    format!(
        r#"You are an expert educational content creator specialized in creating detailed, comprehensive study cards for effective learning.

Your task is to analyze the provided text and:
1. Generate a concise, descriptive title for the topic (max 100 characters)
2. Create {min}-{max} detailed study cards that cover the key concepts, important information, and critical details

Guidelines for creating cards:
1. Each card should be substantial and detailed (150-300 words)
2. Focus on important concepts, facts, definitions, and processes
3. Include context and explanations, not just isolated facts
4. Make content self-contained so it can be understood without the original source
5. Use clear, concise language but provide thorough explanations
6. Include examples where relevant
7. Cover different aspects of the content (concepts, applications, comparisons, etc.)
8. Format content using Markdown for better readability:
   - Use **bold** for key terms and important concepts
   - Use *italics* for secondary emphasis
   - Use bullet points (- or *) or numbered lists (1., 2., 3.) for steps or multiple items
   - Use `inline code` for technical terms, commands, or code snippets
   - Use ```code blocks``` for multi-line code examples
   - Use > blockquotes for definitions or key takeaways
   - Use line breaks between paragraphs for readability

Return ONLY a valid JSON object with this exact structure:
{{
    "topic_title": "Brief, descriptive title for the entire topic",
    "cards": [
        {{
            "title": "Brief title of the concept (max 100 characters)",
            "content": "Detailed explanation in Markdown format (150-300 words)"
        }},
        {{
            "title": "Another concept title",
            "content": "Another detailed explanation..."
        }}
    ]
}}

IMPORTANT:
- Return ONLY the JSON object, no additional text or formatting
- MUST include {min}-{max} cards in the array (adjust based on content depth)"#
    )
}

/// User prompt for manual text input.
pub fn text_user_prompt(title: &str, content: &str, policy: CardCountPolicy) -> String {
    format!(
        "Create study cards for the following topic:\n\n\
         Title: {title}\n\n\
         Content/Description:\n{content}\n\n\
         Generate a topic title and {}-{} comprehensive, detailed cards that \
         thoroughly cover the key concepts with examples and explanations.",
        policy.min, policy.max
    )
}

/// User prompt for content extracted from a document, image set, or link.
///
/// `source_label` names where the text came from ("document", "3 image(s)",
/// "article at https://…") so the model can calibrate its summary.
pub fn extracted_user_prompt(
    source_label: &str,
    title_hint: Option<&str>,
    content: &str,
    policy: CardCountPolicy,
) -> String {
    let mut prompt = format!(
        "Analyze the following content extracted from {source_label} and create \
         comprehensive study cards:\n\n"
    );
    if let Some(title) = title_hint {
        prompt.push_str(&format!("Title: {title}\n\n"));
    }
    prompt.push_str(&format!(
        "Content:\n{content}\n\n\
         Generate a topic title and {}-{} comprehensive cards covering the most \
         important concepts.",
        policy.min, policy.max
    ));
    prompt
}
