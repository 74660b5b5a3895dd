//! Built-in corpus definitions and reference-text chapter parsing.
//!
//! The protocol, calculation and emergency categories are static text. The
//! reference category is built from an optional long-form text supplied by
//! the caller; reading that text from disk is the application's job.

use tracing::warn;

use crate::models::{Corpus, SourceGroup};

/// Category holding the institution's reference text.
pub const REFERENCE_CATEGORY: &str = "kkh_baby_bear_book_section01";

struct StaticEntry {
    category: &'static str,
    key: &'static str,
    title: &'static str,
    text: &'static str,
}

const STATIC_ENTRIES: &[StaticEntry] = &[
    StaticEntry {
        category: "protocols",
        key: "hand_hygiene",
        title: "Hand Hygiene Protocol",
        text: "Hand hygiene is the most important measure to prevent healthcare-associated infections.

When to perform hand hygiene:
1. Before patient contact
2. Before aseptic procedures
3. After body fluid exposure risk
4. After patient contact
5. After contact with patient surroundings

Method:
- Use alcohol-based hand rub for 20-30 seconds
- Wash with soap and water for 40-60 seconds if hands are visibly soiled

Key points:
- Remove jewelry and watches
- Cover all surfaces of hands and fingers
- Allow to air dry completely",
    },
    StaticEntry {
        category: "protocols",
        key: "medication_administration",
        title: "Five Rights of Medication Administration",
        text: "The Five Rights ensure safe medication administration:

1. Right Patient - Verify patient identity using two identifiers
2. Right Drug - Check medication name against order
3. Right Dose - Verify correct dosage calculation
4. Right Route - Confirm appropriate administration route
5. Right Time - Administer at prescribed intervals

Additional considerations:
- Right documentation
- Right reason
- Right response (monitor for effects)

Before administration:
- Check allergies
- Verify contraindications
- Calculate dosages carefully
- Check expiration dates",
    },
    StaticEntry {
        category: "protocols",
        key: "infection_control",
        title: "Standard Precautions",
        text: "Standard precautions apply to all patients regardless of diagnosis:

Personal Protective Equipment (PPE):
- Gloves: For contact with blood, body fluids, mucous membranes
- Gowns: When clothing may be contaminated
- Masks/Respirators: For respiratory protection
- Eye protection: When splashing is anticipated

Safe practices:
- Hand hygiene before and after patient contact
- Safe injection practices
- Proper handling of contaminated equipment
- Environmental cleaning and disinfection

Isolation precautions:
- Contact: MRSA, C. diff, wound infections
- Droplet: Influenza, pertussis, meningitis
- Airborne: TB, measles, varicella",
    },
    StaticEntry {
        category: "calculations",
        key: "fluid_requirements",
        title: "Pediatric Fluid Requirements (Holliday-Segar Method)",
        text: "Daily fluid requirements:
- First 10 kg: 100 mL/kg/day
- Next 10 kg (11-20 kg): 50 mL/kg/day
- Each kg >20 kg: 20 mL/kg/day

Hourly rates:
- First 10 kg: 4 mL/kg/hr
- Next 10 kg: 2 mL/kg/hr
- Each kg >20 kg: 1 mL/kg/hr",
    },
    StaticEntry {
        category: "calculations",
        key: "drug_calculations",
        title: "Drug Dosage Calculations",
        text: "Basic formula: Dose = (Desired dose × Volume) / Concentration

IV flow rate: Rate (mL/hr) = Volume (mL) / Time (hr)

Pediatric dosing: Dose = Weight (kg) × Dose per kg

Concentration: mg/mL = Total drug (mg) / Total volume (mL)

Common doses:
- Paracetamol: 10-15 mg/kg every 4-6 hours
- Ibuprofen: 5-10 mg/kg every 6-8 hours",
    },
    StaticEntry {
        category: "emergency_procedures",
        key: "cpr_adult",
        title: "Adult CPR Guidelines",
        text: "Basic Life Support (BLS) sequence:

1. Check responsiveness and breathing
2. Call for help/activate emergency response
3. Check pulse (10 seconds maximum)
4. Begin chest compressions if no pulse

Chest compressions:
- Rate: 100-120 compressions per minute
- Depth: At least 2 inches (5 cm)
- Allow complete chest recoil
- Minimize interruptions

Compression-to-ventilation ratio:
- 30:2 (single rescuer)
- Continuous compressions with advanced airway

Switch compressors every 2 minutes to prevent fatigue",
    },
];

/// A chapter cut out of the reference text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub key: &'static str,
    pub title: &'static str,
    pub text: String,
}

struct ChapterMarker {
    key: &'static str,
    title: &'static str,
    heading: &'static str,
    /// Tried in order; the first one found after the heading ends the chapter.
    ends: &'static [&'static str],
}

const CHAPTERS: &[ChapterMarker] = &[
    ChapterMarker {
        key: "recognising_critically_ill_child",
        title: "Recognising the Critically Ill Child",
        heading: "Recognising the Critically Ill Child",
        ends: &["CHAPTER 2", "Cardiopulmonary Resuscitation"],
    },
    ChapterMarker {
        key: "pediatric_cpr",
        title: "Pediatric Cardiopulmonary Resuscitation",
        heading: "Cardiopulmonary Resuscitation",
        ends: &["CHAPTER 3", "Drug Overdose and Poisoning"],
    },
    ChapterMarker {
        key: "drug_overdose_poisoning",
        title: "Pediatric Drug Overdose and Poisoning",
        heading: "Drug Overdose and Poisoning",
        ends: &[],
    },
];

/// Split the reference text into its known chapters.
///
/// A chapter runs from its heading to the first end marker found after it,
/// or to the end of the text. Missing headings are skipped.
pub fn parse_chapters(text: &str) -> Vec<Chapter> {
    CHAPTERS
        .iter()
        .filter_map(|m| {
            let start = text.find(m.heading)?;
            let after = start + m.heading.len();
            let end = m
                .ends
                .iter()
                .find_map(|e| text[after..].find(e).map(|i| after + i))
                .unwrap_or(text.len());
            let body = text[start..end].trim();
            (!body.is_empty()).then(|| Chapter {
                key: m.key,
                title: m.title,
                text: body.to_string(),
            })
        })
        .collect()
}

/// Build the full corpus. `reference_text` of `None` or blank yields no
/// reference records.
pub fn build_corpus(reference_text: Option<&str>) -> Corpus {
    let mut corpus = Corpus::new();
    for e in STATIC_ENTRIES {
        corpus.insert(e.category, e.key, e.title, e.text, SourceGroup::Protocol);
    }

    match reference_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => {
            for chapter in parse_chapters(text) {
                corpus.insert(
                    REFERENCE_CATEGORY,
                    chapter.key,
                    chapter.title,
                    &chapter.text,
                    SourceGroup::Reference,
                );
            }
            corpus.insert(
                REFERENCE_CATEGORY,
                "full_section01_content",
                "KKH Baby Bear Book - Section 01: Medical Emergencies (Full Text)",
                text,
                SourceGroup::Reference,
            );
        }
        None => warn!("no reference text supplied; corpus has protocol entries only"),
    }
    corpus
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Preface\nCHAPTER 1\nRecognising the Critically Ill Child\nLook for poor perfusion.\nCHAPTER 2\nCardiopulmonary Resuscitation\nCompress 100-120 per minute.\nCHAPTER 3\nDrug Overdose and Poisoning\nParacetamol antidote is NAC.";

    #[test]
    fn test_static_corpus_order() {
        let corpus = build_corpus(None);
        let names: Vec<&str> = corpus.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["protocols", "calculations", "emergency_procedures"]);
        assert_eq!(corpus.len(), 6);
        assert!(corpus.records().all(|r| !r.is_reference()));
    }

    #[test]
    fn test_parse_chapters() {
        let chapters = parse_chapters(SAMPLE);
        assert_eq!(chapters.len(), 3);
        assert_eq!(
            chapters[0].text,
            "Recognising the Critically Ill Child\nLook for poor perfusion."
        );
        assert!(chapters[1].text.starts_with("Cardiopulmonary Resuscitation"));
        assert!(!chapters[1].text.contains("CHAPTER 3"));
        assert!(chapters[2].text.ends_with("NAC."));
    }

    #[test]
    fn test_chapter_falls_back_to_next_heading() {
        let text = "Recognising the Critically Ill Child\nA\nCardiopulmonary Resuscitation\nB";
        let chapters = parse_chapters(text);
        assert_eq!(chapters[0].text, "Recognising the Critically Ill Child\nA");
    }

    #[test]
    fn test_reference_records_added() {
        let corpus = build_corpus(Some(SAMPLE));
        let reference = corpus.category(REFERENCE_CATEGORY).unwrap();
        assert_eq!(reference.items.len(), 4);
        assert!(reference.items.iter().all(|r| r.is_reference()));
        assert_eq!(
            reference.items[3].id,
            "kkh_baby_bear_book_section01/full_section01_content"
        );
    }

    #[test]
    fn test_blank_reference_text_is_ignored() {
        assert!(build_corpus(Some("   ")).category(REFERENCE_CATEGORY).is_none());
    }
}
