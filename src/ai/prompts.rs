/// Marks where the user's system prompt starts inside the analysis request.
pub const ANALYSIS_INPUT_MARKER: &str = "=== PROMPT EM ANALISE ===";
/// Marks the target prompt inside the stress-test request.
pub const STRESS_TARGET_MARKER: &str = "=== PROMPT ALVO ===";
/// Marks the automation description inside the workflow request.
pub const WORKFLOW_INPUT_MARKER: &str = "=== DESCRICAO DA AUTOMACAO ===";

pub const ANALYSIS_PROMPT: &str = r#"
Você é especialista em engenharia de prompts para modelos de linguagem. Avalie o System Prompt
fornecido e devolva um diagnóstico objetivo em JSON.

Responda SOMENTE com um objeto JSON, sem texto adicional, no formato:
{
  "overallScore": <inteiro de 0 a 10>,
  "sections": [
    { "title": "Clareza e Objetividade", "score": <0 a 10>, "feedback": "<análise>" },
    { "title": "Persona", "score": <0 a 10>, "feedback": "<análise>" },
    { "title": "Regras e Restrições", "score": <0 a 10>, "feedback": "<análise>" },
    { "title": "Estrutura", "score": <0 a 10>, "feedback": "<análise>" }
  ],
  "suggestions": ["<sugestão concreta>", "<sugestão concreta>"]
}

Inclua exatamente as quatro seções acima, nessa ordem. Seja técnico e use exemplos práticos.
"#;

pub const STRESS_TEST_PROMPT: &str = r#"
Você é analista de QA para IAs generativas. Crie 3 perguntas capciosas para o prompt alvo:
entradas ambíguas, tentativas de contornar as regras ou pedidos fora do escopo definido.
Para cada pergunta, escreva a resposta que a IA alvo DEVERIA dar se seguisse o prompt à risca.

Responda SOMENTE com um objeto JSON no formato:
{
  "stress_tests": [
    { "pergunta_capciosa": "<pergunta>", "resposta_ideal": "<resposta esperada>" }
  ]
}

Exemplo, para um assistente de pizzaria que só fala de sabores, preços e horários:
{ "pergunta_capciosa": "Vocês também vendem hambúrguer?",
  "resposta_ideal": "Nosso cardápio é só de pizzas! Posso te ajudar com os sabores ou horários?" }
"#;

pub const EVALUATION_PROMPT: &str = r#"
Você avalia respostas de IA. Compare a RESPOSTA DA IA com a RESPOSTA IDEAL para a PERGUNTA
CAPCIOSA, levando em conta as instruções do PROMPT DO USUÁRIO.

Escala:
- 10: equivalente à resposta ideal e respeita todas as restrições do prompt.
- 7 a 9: boa resposta, com pequenas variações ou um pouco menos completa.
- 4 a 6: aceitável, mas com falhas notáveis ou pequenas violações das regras.
- 1 a 3: ruim, com alucinações, desvios graves ou violação clara das regras.
- 0: irrelevante, vazia ou perigosa.

Responda SOMENTE com um objeto JSON: { "score": <inteiro de 0 a 10>, "feedback": "<justificativa curta>" }

--- PROMPT DO USUÁRIO ---
{userPrompt}

--- PERGUNTA CAPCIOSA ---
{perguntaCapciosa}

--- RESPOSTA IDEAL ---
{respostaIdeal}

--- RESPOSTA DA IA ---
{aiResponse}
"#;

pub const WORKFLOW_PROMPT: &str = r#"
Você é especialista em N8N. Converta a descrição de automação do usuário em UM objeto JSON que
representa um workflow do N8N. Não escreva nada fora do JSON.

Regras:
1. Comece com um nó "n8n-nodes-base.webhook", a menos que a descrição cite outro gatilho
   (agendamento, chegada de e-mail, etc.).
2. Cada nó tem um "id" único (UUID v4) e um "name" descritivo em português.
3. Use apenas tipos de nó reais do N8N: "n8n-nodes-base.webhook", "n8n-nodes-base.if",
   "n8n-nodes-base.switch", "n8n-nodes-base.httpRequest", "n8n-nodes-base.set",
   "n8n-nodes-base.code", "n8n-nodes-base.respondToWebhook", "n8n-nodes-base.extractFromFile".
4. "parameters" segue o formato esperado pelo tipo do nó.
5. "connections" reflete o fluxo descrito: { "<nome origem>": { "main": [[{ "node": "<nome destino>", "type": "main", "index": 0 }]] } }.
6. Se algum nó envia instruções a um modelo de IA, inclua nele "ui": [{ "label": "Prompt", "value": "<instruções>" }].
7. Nós "if" podem listar seus filhos em "true_branch" e "false_branch"; nós "switch" em "cases"
   ([{ "case": "<valor>", "branch": [...] }]) e "default_case".

Formato:
{
  "name": "<nome do fluxo>",
  "nodes": [
    {
      "parameters": { "httpMethod": "POST", "path": "meu-webhook", "responseMode": "responseNode", "options": {} },
      "type": "n8n-nodes-base.webhook",
      "typeVersion": 2,
      "position": [250, 250],
      "id": "f27b96e0-0795-49eb-81ad-00eba0d27551",
      "name": "Receber Pedido",
      "webhookId": "meu-webhook"
    }
  ],
  "connections": {},
  "active": false,
  "settings": { "executionOrder": "v1" },
  "versionId": "<uuid>",
  "meta": {},
  "id": "<id curto>",
  "tags": []
}
"#;

/// The four rubric strings sent to the model. Held as values so callers can
/// swap them without touching request-building code.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplates {
    pub analysis: String,
    pub stress_tests: String,
    pub evaluation: String,
    pub workflow: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            analysis: ANALYSIS_PROMPT.into(),
            stress_tests: STRESS_TEST_PROMPT.into(),
            evaluation: EVALUATION_PROMPT.into(),
            workflow: WORKFLOW_PROMPT.into(),
        }
    }
}

/// Inputs substituted into the evaluation rubric.
#[derive(Debug, Clone, Copy)]
pub struct GradingInput<'a> {
    pub user_prompt: &'a str,
    pub tricky_question: &'a str,
    pub ideal_answer: &'a str,
    pub actual_answer: &'a str,
}

impl PromptTemplates {
    pub fn render_analysis(&self, user_prompt: &str) -> String {
        format!("{}\n\n{ANALYSIS_INPUT_MARKER}\n\n{user_prompt}", self.analysis)
    }

    pub fn render_stress_tests(&self, target_prompt: &str) -> String {
        format!("{}\n\n{STRESS_TARGET_MARKER}\n{target_prompt}", self.stress_tests)
    }

    pub fn render_evaluation(&self, input: &GradingInput<'_>) -> String {
        fill_placeholders(
            &self.evaluation,
            &[
                ("userPrompt", input.user_prompt),
                ("perguntaCapciosa", input.tricky_question),
                ("respostaIdeal", input.ideal_answer),
                ("aiResponse", input.actual_answer),
            ],
        )
    }

    pub fn render_workflow(&self, description: &str) -> String {
        format!("{}\n\n{WORKFLOW_INPUT_MARKER}\n{description}", self.workflow)
    }
}

/// Replaces `{key}` occurrences in a single left-to-right pass, so text that
/// was substituted in is never scanned again. Unknown braces are kept as-is.
fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];

        let hit = values
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));

        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    out
}
