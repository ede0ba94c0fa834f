//! Prompt templates sent to the generative model.
//!
//! Templates with placeholders are filled with [`fill`]; `{0}`, `{1}`, ... are
//! replaced positionally.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Feature categories the vision model reports for every image
pub const FEATURE_CATEGORIES: [&str; 9] = [
    "visual_style",
    "color_palette",
    "composition",
    "subject_matter",
    "lighting",
    "photography_technique",
    "text_graphics",
    "emotion_mood",
    "brand_elements",
];

/// Per-image feature extraction prompt; the reply is a JSON object keyed by category
pub const IMAGE_FEATURES: &str = r#"
Act as a visual designer reviewing a social media image.

Describe only what can be seen in the image, grouped into these categories:
visual_style, color_palette, composition, subject_matter, lighting,
photography_technique, text_graphics, emotion_mood, brand_elements.

Reply with a single JSON object whose keys are exactly those category names
and whose values are arrays of short descriptive phrases. Use an empty array
when a category does not apply. Output the JSON object and nothing else."#;

/// `{0}`: common features of high performers, `{1}`: of low performers
pub const INSIGHTS_REPORT: &str = r#"
You advise a brand on the visual strategy of its social media posts.

Feature frequencies for the best performing posts:
{0}

Feature frequencies for the weaker posts:
{1}

Write a report with clear headed sections that:
- names the five to seven visual features most characteristic of the best posts
- contrasts the best and the weaker posts
- gives concrete recommendations for future visuals
- explains why those visual choices are likely to resonate"#;

/// System instruction for generating add-on sandbox code
pub const DESIGN_CODE_SYSTEM: &str = r#"
You write `code.js` for an Adobe Express add-on document sandbox.

The file must keep this skeleton unchanged and only fill in the body of
`createShape` above the two insertion lines:

```javascript
import addOnSandboxSdk from "add-on-sdk-document-sandbox";
import { editor, colorUtils } from "express-document-sdk";

const { runtime } = addOnSandboxSdk.instance;

function start() {
    const sandboxApi = {
        createShape: () => {
            // build the node here and assign it to `shape`
            const insertionParent = editor.context.insertionParent;
            insertionParent.children.append(shape);
        }
    };
    runtime.exposeApi(sandboxApi);
}
start();
```

Use any Express Document SDK node (ellipse, rectangle, path, text, group)
with any geometry, fill or stroke. Keep the import from
"add-on-sdk-document-sandbox". Return the complete file in one ```javascript
code block."#;

/// `{0}`: user request
pub const DESIGN_CODE_REQUEST: &str = "User request: {0}";

/// `{0}`: guideline text (empty when the document is attached)
pub const BRAND_COMPLIANCE: &str = r#"
Review the attached image against the brand guidelines below.

BRAND GUIDELINES:
{0}

Judge the overall brand impression. Creative variation is welcome; flag only
clear violations of core rules such as wrong logo, off-brand colours or a
competing brand.

Answer in exactly this layout:

COMPLIANCE STATUS: COMPLIANT | NON-COMPLIANT | NEEDS REVIEW

VIOLATIONS FOUND:
- serious violations only, or "None"

COMPLIANT ASPECTS:
- what matches the guidelines

RECOMMENDATIONS:
- minor suggestions, or "None"

OVERALL SCORE: N/10

SUMMARY: one sentence"#;

/// Text used in place of the guidelines when they are attached as a document
pub const GUIDELINES_ATTACHED: &str = "(see the attached guidelines document)";

/// `{0}`: summary of the reverse image search
pub const COPYRIGHT_VERDICT: &str = r#"
{0}

Judge the copyright risk of the searched image from these reverse image
search results.

Answer in exactly this layout:

COPYRIGHT STATUS: SAFE | RISKY | COPYRIGHTED

VERDICT:
- one sentence

RISK LEVEL: LOW | MEDIUM | HIGH

DETAILS:
- findings and matching stock sources

RECOMMENDATIONS:
- how to proceed safely

SUMMARY: one sentence"#;

/// `{0}` request, `{1}` styles, `{2}` colours, `{3}` composition,
/// `{4}` subjects, `{5}` moods, `{6}` text/graphics, `{7}` guidelines,
/// `{8}` insights
pub const IMAGE_PROMPT: &str = r#"
Write one prompt for a text-to-image model that renders a social media post.

Request from the user:
{0}

Features shared by the brand's best performing posts:
- styles: {1}
- colours: {2}
- composition: {3}
- subjects: {4}
- mood: {5}
- text and graphics: {6}

Brand guidelines excerpt:
{7}

Analysis insights:
{8}

The prompt should be 200 to 300 words of concrete, comma separated visual
descriptors that honour the request, the features and the guidelines. End it
with "NO TEXT, no words, no letters, no typography, text-free" when the
image should contain no text. Reply with the prompt only."#;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\d+)\}").expect("valid regex"));

/// Replaces `{0}`, `{1}`, ... in `template` with `args` in a single pass
///
/// Placeholders without a matching argument are left as they are.
pub fn fill(template: &str, args: &[&str]) -> String {
    PLACEHOLDER
        .replace_all(template.trim_start(), |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| args.get(i))
                .map(|arg| arg.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
