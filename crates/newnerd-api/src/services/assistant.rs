//! Chat-backed teaching helpers: the tutoring chat, answer grading, and
//! question generation.
//!
//! Prompts are in Portuguese, the language of the web clients.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use newnerd_core::{ChatBackend, ChatCompletion, ChatMessage, ChatRequest, Error, Result};

/// `papel` value that switches the chat to the Socratic study tutor.
pub const TUTOR_ROLE: &str = "tutor_estudos";

const TUTOR_PROMPT: &str = "Atue como um Tutor Socrático. Sua missão é guiar o aluno à resposta, \
nunca entregá-la diretamente. Use perguntas, analogias e exemplos para estimular o raciocínio. \
Seja paciente e encorajador; se o aluno estiver perdido, ofereça uma dica pequena e termine com \
uma pergunta.";

const TEACHER_ASSISTANT_PROMPT: &str = "Você é um assistente pedagógico para professores. \
Ajude com planejamento, atividades e estratégias de ensino.";

const GENERATOR_SYSTEM_PROMPT: &str = "Você é um gerador de questões educacionais. Retorne apenas \
JSON válido. Para questões discursivas, SEMPRE gere uma resposta_esperada completa em 3-5 \
parágrafos, NUNCA use texto genérico como Texto coeso.";

/// Phrasing styles rotated by seed so repeated requests vary.
const QUESTION_STYLES: [&str; 10] = [
    "formule a questão em um cenário cotidiano",
    "use linguagem prática e objetiva",
    "contextualize com uma situação real",
    "inicie com uma pergunta reflexiva",
    "aborde de forma interdisciplinar",
    "apresente dados ou exemplos numéricos",
    "utilize um problema de aplicação",
    "varie o tempo verbal da instrução",
    "use analogias para ilustrar o conceito",
    "reformule o enunciado com estrutura indireta",
];

/// Estimated USD cost per token reported on generated questions.
pub const COST_PER_TOKEN: f64 = 0.000_001_5;

/// Provider tag stamped on generated questions.
pub const PROVIDER_TAG: &str = "openai";

/// System prompt for the chat, chosen by the caller's role.
pub fn chat_system_prompt(role: Option<&str>) -> &'static str {
    match role {
        Some(TUTOR_ROLE) => TUTOR_PROMPT,
        _ => TEACHER_ASSISTANT_PROMPT,
    }
}

// =============================================================================
// GRADING
// =============================================================================

/// How an answer is graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    /// Multiple choice, true/false, or matching: right or wrong.
    Objective,
    /// Free text graded 0 to 10.
    Discursive,
}

impl AnswerKind {
    /// Objective when the question type names multiple choice, true/false,
    /// or matching; discursive otherwise.
    pub fn from_question_type(question_type: Option<&str>) -> Self {
        let normalized = question_type.unwrap_or_default().to_lowercase();
        if ["multipla", "verdadeiro", "associacao"]
            .iter()
            .any(|k| normalized.contains(k))
        {
            Self::Objective
        } else {
            Self::Discursive
        }
    }
}

/// A student's answer to grade against the official key.
#[derive(Debug, Clone)]
pub struct GradingInput {
    pub question: String,
    pub answer: String,
    pub answer_key: String,
    pub kind: AnswerKind,
}

impl GradingInput {
    pub fn prompt(&self) -> String {
        match self.kind {
            AnswerKind::Objective => format!(
                "Você é um corretor de provas objetivas.\n\n\
                 DADOS:\n\
                 - Questão: \"{question}\"\n\
                 - Gabarito Oficial: \"{key}\"\n\
                 - Resposta do Aluno: \"{answer}\"\n\n\
                 TAREFA:\n\
                 Verifique se a opção escolhida pelo aluno corresponde ao gabarito.\n\
                 - Se o sentido for o mesmo (ex: Aluno escolheu \"B\" e Gabarito é \"B) Texto\"), considere CORRETO.\n\
                 - Se for Verdadeiro/Falso, verifique a lógica.\n\n\
                 RETORNE JSON:\n\
                 {{\n\
                 \x20 \"nota\": (10 se acertou, 0 se errou),\n\
                 \x20 \"correta\": (true ou false),\n\
                 \x20 \"feedback\": \"Breve explicação de por que está certo ou qual era a certa se errou.\",\n\
                 \x20 \"pontos_melhoria\": \"Tópico para revisar se errou, ou 'Parabéns' se acertou.\"\n\
                 }}",
                question = self.question,
                key = self.answer_key,
                answer = self.answer,
            ),
            AnswerKind::Discursive => format!(
                "Você é um professor corretor RIGOROSO.\n\n\
                 CONTEXTO:\n\
                 - Pergunta: \"{question}\"\n\
                 - Gabarito/Expectativa: \"{key}\"\n\n\
                 RESPOSTA DO ALUNO:\n\
                 \"{answer}\"\n\n\
                 REGRAS DE NOTA ZERO (0):\n\
                 1. Respostas como \"teste\", \"ola\", \"não sei\", \".\" = NOTA 0.\n\
                 2. Fuga total do tema = NOTA 0.\n\n\
                 TAREFA:\n\
                 Avalie a resposta de 0 a 10.\n\n\
                 RETORNE JSON:\n\
                 {{\n\
                 \x20 \"nota\": (Número 0 a 10),\n\
                 \x20 \"correta\": (true se nota >= 6),\n\
                 \x20 \"feedback\": \"Explicação do erro ou acerto.\",\n\
                 \x20 \"pontos_melhoria\": \"O que faltou na resposta.\"\n\
                 }}",
                question = self.question,
                key = self.answer_key,
                answer = self.answer,
            ),
        }
    }
}

/// Grade returned to the client, as the model produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub nota: f64,
    pub correta: bool,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub pontos_melhoria: String,
}

// =============================================================================
// QUESTION GENERATION
// =============================================================================

/// What to generate. Defaults mirror the web client's form.
#[derive(Debug, Clone)]
pub struct QuestionSpec {
    pub question_type: String,
    pub topic: String,
    pub subject: String,
    pub grade_level: String,
    pub difficulty: String,
    pub count: u32,
    pub seed: u64,
    pub variation: String,
}

impl QuestionSpec {
    pub fn new(topic: impl Into<String>) -> Self {
        let id = Uuid::new_v4();
        Self {
            question_type: "multipla_escolha".to_string(),
            topic: topic.into(),
            subject: "geral".to_string(),
            grade_level: "auto".to_string(),
            difficulty: "média".to_string(),
            count: 1,
            seed: id.as_u128() as u64,
            variation: id.simple().to_string()[..8].to_string(),
        }
    }

    pub fn style(&self) -> &'static str {
        QUESTION_STYLES[(self.seed % QUESTION_STYLES.len() as u64) as usize]
    }

    /// JSON layout the model must follow for this question type.
    fn format_instructions(&self) -> String {
        let tail = format!(
            "  \"tipo_questao\": \"{kind}\",\n  \"disciplina\": \"{subject}\",\n  \"serie\": \"{grade}\",\n  \"dificuldade\": \"{difficulty}\"\n}}",
            kind = self.question_type,
            subject = self.subject,
            grade = self.grade_level,
            difficulty = self.difficulty,
        );
        match self.question_type.as_str() {
            "discursiva" => format!(
                "IMPORTANTE para questões discursivas:\n\
                 1. Gere um enunciado claro e contextualizado\n\
                 2. Gere uma resposta_esperada COMPLETA com 3-5 parágrafos que sirva como modelo de resposta\n\
                 3. Gere critérios de avaliação detalhados\n\n\
                 Formato JSON OBRIGATÓRIO:\n\
                 {{\n\
                 \x20 \"enunciado\": \"texto da questão\",\n\
                 \x20 \"resposta_esperada\": \"RESPOSTA MODELO COMPLETA EM 3-5 PARÁGRAFOS. Deve ser um exemplo real de uma boa resposta que aborda todos os aspectos solicitados no enunciado, com argumentação completa, exemplos concretos e conclusão.\",\n\
                 \x20 \"criterios_avaliacao\": [\n\
                 \x20   {{\"aspecto\": \"Compreensão\", \"descricao\": \"Domínio do conteúdo\", \"peso\": 40}},\n\
                 \x20   {{\"aspecto\": \"Argumentação\", \"descricao\": \"Coerência e clareza\", \"peso\": 30}},\n\
                 \x20   {{\"aspecto\": \"Exemplos\", \"descricao\": \"Aplicações práticas\", \"peso\": 30}}\n\
                 \x20 ],\n{tail}"
            ),
            "multipla_escolha" => format!(
                "Formato JSON OBRIGATÓRIO para múltipla escolha:\n\
                 {{\n\
                 \x20 \"enunciado\": \"texto da questão\",\n\
                 \x20 \"alternativas\": [\n\
                 \x20   {{\"letra\": \"A\", \"texto\": \"...\"}},\n\
                 \x20   {{\"letra\": \"B\", \"texto\": \"...\"}},\n\
                 \x20   {{\"letra\": \"C\", \"texto\": \"...\"}},\n\
                 \x20   {{\"letra\": \"D\", \"texto\": \"...\"}}\n\
                 \x20 ],\n\
                 \x20 \"gabarito\": \"A\",\n\
                 \x20 \"justificativa_gabarito\": \"Explicação detalhada de por que A é a resposta correta\",\n{tail}"
            ),
            "verdadeiro_falso" => format!(
                "Formato JSON OBRIGATÓRIO para verdadeiro/falso:\n\
                 {{\n\
                 \x20 \"enunciado\": \"Analise as afirmações abaixo:\",\n\
                 \x20 \"afirmacoes\": [\n\
                 \x20   {{\"texto\": \"Afirmação 1\", \"valor\": true}},\n\
                 \x20   {{\"texto\": \"Afirmação 2\", \"valor\": false}},\n\
                 \x20   {{\"texto\": \"Afirmação 3\", \"valor\": true}}\n\
                 \x20 ],\n{tail}"
            ),
            _ => String::new(),
        }
    }

    pub fn prompt(&self) -> String {
        let plural = self.count > 1;
        format!(
            "Variação {variation} | Estilo: {style}\n\n\
             Você é um gerador de questões didáticas originais para professores.\n\
             Retorne somente JSON válido, sem markdown, sem backticks.\n\n\
             Gere {count} {noun} do tipo \"{kind}\" sobre o tema \"{topic}\".\n\
             Disciplina: {subject}, Série: {grade}, Dificuldade: {difficulty}.\n\n\
             {format}\n\n\
             REGRAS CRÍTICAS:\n\
             - Se tipo for discursiva, a resposta_esperada DEVE ter 3-5 parágrafos COMPLETOS\n\
             - NUNCA use apenas \"Texto coeso com 3-5 parágrafos\" - isso é inválido\n\
             - A resposta_esperada deve ser um EXEMPLO REAL de uma boa resposta\n\
             - Retorne apenas JSON válido, sem markdown\n\
             - Para {shape}",
            variation = self.variation,
            style = self.style(),
            count = self.count,
            noun = if plural { "questões" } else { "questão" },
            kind = self.question_type,
            topic = self.topic,
            subject = self.subject,
            grade = self.grade_level,
            difficulty = self.difficulty,
            format = self.format_instructions(),
            shape = if plural {
                "múltiplas questões, retorne array"
            } else {
                "uma questão, retorne objeto"
            },
        )
    }
}

/// Questions from a model reply: a bare array, an object holding
/// `questoes`, or a single question object. Non-object entries are dropped.
pub fn parse_questions(content: &str) -> std::result::Result<Vec<Map<String, JsonValue>>, serde_json::Error> {
    let parsed: JsonValue = serde_json::from_str(content)?;
    let items = match parsed {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut obj) => match obj.remove("questoes") {
            Some(JsonValue::Array(items)) => items,
            Some(other) => {
                obj.insert("questoes".to_string(), other);
                vec![JsonValue::Object(obj)]
            }
            None => vec![JsonValue::Object(obj)],
        },
        other => vec![other],
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            JsonValue::Object(obj) => Some(obj),
            other => {
                warn!(item = %other, "Dropping non-object question from model reply");
                None
            }
        })
        .collect())
}

/// Stamp usage and cost on each generated question.
pub fn annotate_questions(
    questions: Vec<Map<String, JsonValue>>,
    total_tokens: u32,
) -> Vec<Map<String, JsonValue>> {
    let cost = f64::from(total_tokens) * COST_PER_TOKEN;
    questions
        .into_iter()
        .map(|mut q| {
            q.insert("tokens_usados".to_string(), total_tokens.into());
            q.insert("custo_estimado".to_string(), cost.into());
            q.insert("api_usada".to_string(), PROVIDER_TAG.into());
            q
        })
        .collect()
}

/// A model reply that could not be read as the expected JSON.
#[derive(Debug)]
pub struct InvalidReply {
    pub raw: String,
    pub reason: String,
}

/// Failure of an assistant call: the backend failed, or it answered with
/// something unusable.
#[derive(Debug)]
pub enum AssistantError {
    Backend(Error),
    InvalidReply(InvalidReply),
}

impl From<Error> for AssistantError {
    fn from(err: Error) -> Self {
        AssistantError::Backend(err)
    }
}

/// Runs the assistant prompts against a chat backend.
pub struct AssistantService {
    chat: Arc<dyn ChatBackend>,
}

impl AssistantService {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self { chat }
    }

    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Continue a conversation under the role's system prompt.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn chat(&self, messages: Vec<ChatMessage>, role: Option<&str>) -> Result<ChatCompletion> {
        let mut conversation = Vec::with_capacity(messages.len() + 1);
        conversation.push(ChatMessage::system(chat_system_prompt(role)));
        conversation.extend(messages);

        self.chat
            .complete(&ChatRequest {
                messages: conversation,
                temperature: Some(0.7),
                max_tokens: Some(500),
                ..Default::default()
            })
            .await
    }

    #[instrument(skip(self, input), fields(kind = ?input.kind))]
    pub async fn grade(&self, input: &GradingInput) -> std::result::Result<Grade, AssistantError> {
        let completion = self
            .chat
            .complete(&ChatRequest {
                messages: vec![ChatMessage::user(input.prompt())],
                temperature: Some(0.1),
                json_object: true,
                ..Default::default()
            })
            .await?;

        serde_json::from_str(&completion.content).map_err(|e| {
            AssistantError::InvalidReply(InvalidReply {
                raw: completion.content.clone(),
                reason: e.to_string(),
            })
        })
    }

    #[instrument(skip(self, spec), fields(question_type = %spec.question_type, count = spec.count))]
    pub async fn generate_questions(
        &self,
        spec: &QuestionSpec,
    ) -> std::result::Result<Vec<Map<String, JsonValue>>, AssistantError> {
        let completion = self
            .chat
            .complete(&ChatRequest {
                messages: vec![
                    ChatMessage::system(GENERATOR_SYSTEM_PROMPT),
                    ChatMessage::user(spec.prompt()),
                ],
                temperature: Some(0.65),
                top_p: Some(0.9),
                frequency_penalty: Some(0.2),
                presence_penalty: Some(0.15),
                json_object: true,
                ..Default::default()
            })
            .await?;

        let questions = parse_questions(&completion.content).map_err(|e| {
            AssistantError::InvalidReply(InvalidReply {
                raw: completion.content.clone(),
                reason: e.to_string(),
            })
        })?;

        info!(
            generated = questions.len(),
            total_tokens = completion.total_tokens,
            "Generated questions"
        );
        Ok(annotate_questions(questions, completion.total_tokens))
    }
}
