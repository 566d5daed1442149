use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Passing threshold for primary education (ensino primário).
pub const LIMIAR_PRIMARIO: f64 = 4.45;
/// Passing threshold for secondary education (everything not primário).
pub const LIMIAR_SECUNDARIO: f64 = 9.45;
/// Ceiling applied to per-disciplina finals before any aggregate decision.
/// Formula-computed grades can exceed the nominal scale and must be clamped.
pub const TECTO_NOTA: f64 = 10.0;
/// Maximum number of non-mandatory failing disciplinas still compatible with
/// a conditional promotion.
pub const TOLERANCIA_CONDICIONAL: usize = 2;
/// A passing average closer than this to the threshold still earns a general
/// follow-up recommendation. Kept under the gap between the secondary
/// threshold and the ceiling so a full-marks pauta is not flagged.
pub const MARGEM_MEDIA: f64 = 0.5;

/// One disciplina's resolved final grade for one aluno.
///
/// `nota` of `None`, or any value `<= 0`, means "not yet graded" — distinct
/// from a real zero, which this grading scale does not produce.
#[derive(Debug, Clone, PartialEq)]
pub struct DisciplinaGrade {
    pub id: String,
    pub nome: String,
    pub nota: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationStatus {
    Transita,
    NaoTransita,
    Condicional,
    AguardandoNotas,
}

impl fmt::Display for ClassificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClassificationStatus::Transita => "Transita",
            ClassificationStatus::NaoTransita => "Não Transita",
            ClassificationStatus::Condicional => "Condicional",
            ClassificationStatus::AguardandoNotas => "Aguardando Notas",
        };
        f.write_str(label)
    }
}

/// Promotion verdict for one aluno. Recomputed from current grades on every
/// request; never stored as a source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub status: ClassificationStatus,
    pub media_geral: Option<f64>,
    pub motivos: Vec<String>,
    pub disciplinas_em_risco: Vec<String>,
    pub acoes_recomendadas: Vec<String>,
}

fn round2(x: f64) -> f64 {
    (100.0 * x).round() / 100.0
}

fn limiar_for_nivel(nivel_ensino: &str) -> f64 {
    let nivel = nivel_ensino.to_lowercase();
    if nivel.contains("primário") || nivel.contains("primario") {
        LIMIAR_PRIMARIO
    } else {
        LIMIAR_SECUNDARIO
    }
}

/// Decides the promotion verdict for one aluno from their per-disciplina
/// final grades.
///
/// Pure and deterministic: identical inputs yield an identical result. Never
/// fails for malformed input — ungradeable entries degrade to "awaiting
/// grades" rather than erroring, so a whole-turma report is never blocked by
/// one aluno's incomplete data.
pub fn classify(
    grades: &[DisciplinaGrade],
    nivel_ensino: &str,
    classe: Option<&str>,
    obrigatorias: &HashSet<String>,
) -> ClassificationResult {
    // At most one entry per disciplina id; keep the first if a caller slips.
    let mut seen: HashSet<&str> = HashSet::new();
    let mut resolved: Vec<(&DisciplinaGrade, f64)> = Vec::new();
    for g in grades {
        if !seen.insert(g.id.as_str()) {
            continue;
        }
        match g.nota {
            Some(v) if v > 0.0 => resolved.push((g, v.min(TECTO_NOTA))),
            _ => {}
        }
    }

    if resolved.is_empty() {
        let contexto = classe.map(|c| format!(" da {}", c)).unwrap_or_default();
        return ClassificationResult {
            status: ClassificationStatus::AguardandoNotas,
            media_geral: None,
            motivos: vec![format!(
                "Sem notas lançadas suficientes para apurar o resultado{}",
                contexto
            )],
            disciplinas_em_risco: Vec::new(),
            acoes_recomendadas: Vec::new(),
        };
    }

    let limiar = limiar_for_nivel(nivel_ensino);
    let media = round2(resolved.iter().map(|(_, nota)| *nota).sum::<f64>() / resolved.len() as f64);

    let em_risco: Vec<&DisciplinaGrade> = resolved
        .iter()
        .filter(|(_, nota)| *nota < limiar)
        .map(|(g, _)| *g)
        .collect();
    let tem_obrigatoria_em_risco = em_risco.iter().any(|g| obrigatorias.contains(&g.id));

    let mut motivos: Vec<String> = Vec::new();
    let mut acoes: Vec<String> = Vec::new();

    let status = if em_risco.is_empty() {
        motivos.push(format!(
            "Aprovado a todas as disciplinas{}",
            classe.map(|c| format!(" da {}", c)).unwrap_or_default()
        ));
        if media < limiar + MARGEM_MEDIA {
            acoes.push(
                "Acompanhamento geral recomendado: média final próxima do limiar de aprovação"
                    .to_string(),
            );
        }
        ClassificationStatus::Transita
    } else if tem_obrigatoria_em_risco || em_risco.len() > TOLERANCIA_CONDICIONAL {
        if tem_obrigatoria_em_risco {
            for g in &em_risco {
                if obrigatorias.contains(&g.id) {
                    motivos.push(format!("Reprovado a {} (disciplina obrigatória)", g.nome));
                } else {
                    motivos.push(format!("Reprovado a {}", g.nome));
                }
            }
        } else {
            motivos.push(format!(
                "Reprovado a mais de {} disciplinas",
                TOLERANCIA_CONDICIONAL
            ));
            for g in &em_risco {
                motivos.push(format!("Reprovado a {}", g.nome));
            }
        }
        ClassificationStatus::NaoTransita
    } else {
        motivos.push("Transição condicional: recuperação obrigatória".to_string());
        for g in &em_risco {
            motivos.push(format!("Nota abaixo do limiar a {}", g.nome));
        }
        ClassificationStatus::Condicional
    };

    for g in &em_risco {
        acoes.push(format!("Recuperação em {}", g.nome));
    }

    ClassificationResult {
        status,
        media_geral: Some(media),
        motivos,
        disciplinas_em_risco: em_risco.iter().map(|g| g.id.clone()).collect(),
        acoes_recomendadas: acoes,
    }
}
