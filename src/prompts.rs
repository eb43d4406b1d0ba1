//! Prompts sent to the vision model.
//!
//! Centralising prompts here keeps prompt engineering out of the retry and
//! parsing code, and lets unit tests inspect them without a model. The
//! schema prompt pins the output contract described in [`crate::schema`];
//! the color prompt pins the six keys read by [`crate::colors`].

/// Instruction block sent ahead of the page images for schema extraction.
pub const SCHEMA_PROMPT: &str = r#"You convert scanned enrollment forms into a JSON Schema for a web form renderer.

The following images are the pages of one form, in order.

## WHOSE FIELDS TO INCLUDE

Include ONLY fields the person enrolling fills in or signs:
- Personal details (name, date of birth, address, gender)
- Contact details (phone, email, preferred language, best time to call)
- Insurance details the enrollee provides from their card
- Consents, authorizations and the enrollee's signature
- Caregiver or guardian details

Leave out every field completed by a professional or the issuing
organisation: prescriber or physician details, license or NPI numbers,
diagnosis codes, prescription details, professional signatures and
certifications. A section headed "for healthcare professionals" or asking
for licensing information is always left out.

## OUTPUT FORMAT

{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "<form title>",
  "description": "<form description>",
  "type": "object",
  "x-form-config": {
    "formId": "<kebab-case-id>",
    "version": "1.0",
    "pages": [
      {
        "pageId": "<page-id>",
        "title": "<page title>",
        "sections": [
          {
            "sectionId": "<section-id>",
            "title": "<section title>",
            "description": "<optional>",
            "layout": [
              { "type": "row", "columns": [ { "width": "50%", "fields": ["<fieldName>"] } ] }
            ]
          }
        ]
      }
    ]
  },
  "properties": {
    "<fieldName>": {
      "type": "string | boolean",
      "title": "<field label>",
      "x-field-config": {
        "required": true,
        "fieldType": "text | email | date | phone | select | radio | checkbox | html",
        "placeholder": "<optional>",
        "options": [ { "value": "yes", "label": "Yes" } ],
        "layout": "horizontal | vertical"
      }
    }
  },
  "required": ["<fieldName>"]
}

## FIELD TYPES

Choose fieldType from the control drawn on the page:
- text: free text line
- email: email address
- date: date boxes or a date line
- phone: phone number
- select: a choice list; include "options"
- radio: mutually exclusive choices; include "options" and a "layout"
- checkbox: a single tick box; use "type": "boolean"
- html: static text that must be shown, such as a consent paragraph

## LAYOUT

- Keep the exact top-to-bottom order of the page.
- Fields that sit side by side share one row; give each column a width
  proportional to its size on the page (50%/50%, 40%/60%, ...).
- A field spanning the page is one column at 100%.
- Group fields under the section headings printed on the form.

## NAMING AND REQUIRED FIELDS

- Field names are camelCase versions of the label ("First Name" -> "firstName").
- A field is required when its label carries an asterisk (*) or "(required)".
  Set "required": true in its x-field-config and list it in the root "required" array.

## JSON VALIDITY

Return raw JSON only: no markdown fences, no commentary before or after.
Every brace and bracket must be closed, there must be no trailing commas,
and quotes, backslashes, tabs and newlines inside strings must be escaped."#;

/// Describes what the color prompt is looking at.
pub const WEBSITE_SOURCE: &str = "website screenshot";
/// Describes what the color prompt is looking at.
pub const DOCUMENT_SOURCE: &str = "PDF document";

/// Instruction block for brand color analysis of `source`.
pub fn color_prompt(source: &str) -> String {
    format!(
        r##"You are looking at a {source} from a company. Identify its brand colors for use on an enrollment form.

Find these six colors in the image:
1. primaryButton: the main call-to-action button
2. header: the header or top navigation background
3. footer: the footer background
4. accent: links, highlights and decorative elements
5. secondaryButton: less prominent buttons
6. sidebar: sidebar or secondary navigation background

Report the colors actually present, not generic defaults. Call-to-action
buttons usually carry the primary brand color.

Return ONLY this JSON object with hex values:
{{
  "primaryButton": "#RRGGBB",
  "header": "#RRGGBB",
  "footer": "#RRGGBB",
  "accent": "#RRGGBB",
  "secondaryButton": "#RRGGBB",
  "sidebar": "#RRGGBB"
}}"##
    )
}
