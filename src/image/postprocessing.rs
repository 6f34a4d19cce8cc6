use crate::diagnosis::Label;
use serde::Serialize;

/// 建议分组（例如饮食、生活方式）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdviceSection {
    pub title: &'static str,
    pub items: Vec<&'static str>,
}

/// 渲染给用户的诊断报告
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Report {
    pub headline: String,
    /// 仅在检测到肿瘤时给出
    pub recommendations: Vec<AdviceSection>,
    pub closing: &'static str,
}

const RECOMMENDATIONS_TITLE: &str = "🚑 Recommended Steps & Lifestyle Changes:";
const CLOSING: &str = "❤️ Stay Healthy & Consult a Doctor for Professional Advice! 🩺";

/// 结果格式化器
pub struct ReportFormatter;

impl ReportFormatter {
    /// 根据标签生成报告
    pub fn render(label: Label) -> Report {
        let recommendations = match label {
            Label::Tumor => Self::lifestyle_advice(),
            Label::NoTumor => Vec::new(),
        };

        Report {
            headline: format!("🩺 Diagnosis Result: {}", label.display_text()),
            recommendations,
            closing: CLOSING,
        }
    }

    fn lifestyle_advice() -> Vec<AdviceSection> {
        vec![
            AdviceSection {
                title: "🥦 Diet & Nutrition:",
                items: vec![
                    "✅ Increase antioxidant-rich foods (berries, leafy greens).",
                    "✅ Eat more omega-3 fatty acids (salmon, walnuts).",
                    "✅ Avoid processed foods & excessive sugar.",
                ],
            },
            AdviceSection {
                title: "🏋️‍♂️ Healthy Lifestyle:",
                items: vec![
                    "✅ Engage in light exercise & yoga.",
                    "✅ Hydrate well – drink plenty of water.",
                    "✅ Manage stress & get enough sleep.",
                ],
            },
        ]
    }
}

impl Report {
    /// 生成 HTML 片段（供 Web UI 直接插入）
    pub fn to_html(&self) -> String {
        let mut html = format!(
            "<h3 class=\"headline\">{}</h3>\n",
            escape_html(&self.headline)
        );

        if !self.recommendations.is_empty() {
            html.push_str("<hr>\n");
            html.push_str(&format!(
                "<h3 class=\"advice-title\">{}</h3>\n<div class=\"advice\">\n",
                escape_html(RECOMMENDATIONS_TITLE)
            ));
            for section in &self.recommendations {
                html.push_str(&format!(
                    "<section>\n<h4>{}</h4>\n<ul>\n",
                    escape_html(section.title)
                ));
                for item in &section.items {
                    html.push_str(&format!("<li>{}</li>\n", escape_html(item)));
                }
                html.push_str("</ul>\n</section>\n");
            }
            html.push_str("</div>\n<hr>\n");
        }

        html.push_str(&format!(
            "<h4 class=\"closing\">{}</h4>\n",
            escape_html(self.closing)
        ));
        html
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_tumor_has_no_recommendations() {
        let report = ReportFormatter::render(Label::NoTumor);
        assert!(report.recommendations.is_empty());
        assert!(report.headline.contains("No Tumor Detected"));
        assert!(!report.to_html().contains("advice"));
    }

    #[test]
    fn tumor_includes_two_advice_sections() {
        let report = ReportFormatter::render(Label::Tumor);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations.iter().all(|s| s.items.len() == 3));
        assert!(report.headline.contains("Brain Tumor Detected"));
    }

    #[test]
    fn html_is_escaped() {
        let html = ReportFormatter::render(Label::Tumor).to_html();
        assert!(html.contains("Diet &amp; Nutrition"));
        assert!(!html.contains("Diet & Nutrition"));
        assert!(html.contains("Consult a Doctor"));
    }
}
