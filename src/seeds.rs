//! Built-in level catalogue, used when GAME_CONFIG_PATH is not set.

use crate::domain::{Challenge, Level, ValidationSpec};

fn regex(p: &str) -> ValidationSpec {
  ValidationSpec::Pattern { pattern: p.into(), literal: false }
}

fn judge(rubric: &str) -> ValidationSpec {
  ValidationSpec::Llm { evaluation_prompt: rubric.into() }
}

fn challenge(id: &str, question: &str, task: &str, initial_prompt: &str, validation: ValidationSpec) -> Challenge {
  Challenge {
    id: id.into(),
    question: question.into(),
    task: task.into(),
    initial_prompt: initial_prompt.into(),
    initial_system_prompt: None,
    hint: None,
    system_prompt_placeholder: None,
    user_prompt_placeholder: None,
    is_immutable_user_prompt: false,
    xml_tags: vec![],
    validation,
  }
}

pub fn seed_levels() -> Vec<Level> {
  vec![
    Level {
      id: "basic-prompt-structure".into(),
      name: "Basic Prompt Structure".into(),
      description: "Learn the fundamentals of structuring prompts".into(),
      challenges: vec![
        Challenge {
          user_prompt_placeholder: Some("Please respond to this message.".into()),
          hint: Some("Be direct and specific in your instruction.".into()),
          ..challenge(
            "counting-to-three",
            "Counting to Three",
            "Edit the prompt to get Claude to count to three.",
            "",
            regex(r"(?s)1.*2.*3"),
          )
        },
        Challenge {
          initial_system_prompt: Some(String::new()),
          system_prompt_placeholder: Some("You are a helpful AI assistant.".into()),
          hint: Some("Think about how a 3-year-old would speak and what words they might use.".into()),
          ..challenge(
            "three-year-old",
            "3-Year-Old Child",
            "Modify the system prompt to make Claude respond like a 3-year-old child.",
            "How big is the sky?",
            regex(r"(?i)giggles|soo"),
          )
        },
      ],
    },
    Level {
      id: "being-clear-direct".into(),
      name: "Being Clear and Direct".into(),
      description: "Practice writing clear and direct prompts".into(),
      challenges: vec![
        Challenge {
          initial_system_prompt: Some(String::new()),
          system_prompt_placeholder: Some("You are a helpful AI assistant.".into()),
          hint: Some("Think about how to instruct Claude to use a specific language.".into()),
          ..challenge(
            "spanish-output",
            "Spanish Output",
            "Modify the system prompt to make Claude output its answer in Spanish.",
            "Hello Claude, how are you?",
            regex(r"(?i)hola"),
          )
        },
        Challenge {
          user_prompt_placeholder: Some("Who is the best basketball player of all time?".into()),
          hint: Some("Be very specific about the format of the answer you want.".into()),
          ..challenge(
            "one-player-only",
            "One Player Only",
            "Modify the prompt so that Claude responds with ONLY the name of one specific basketball player, with no other words or punctuation.",
            "",
            judge(
              "- The response must be exactly the name of one basketball player.\n\
               - No other words are allowed.\n\
               - No punctuation of any kind is allowed, including a trailing period.",
            ),
          )
        },
        Challenge {
          user_prompt_placeholder: Some("Tell me a story.".into()),
          hint: Some(
            "Think about asking for a detailed story with multiple characters, plot twists, and vivid descriptions. \
             You can also specify a minimum word count in your prompt."
              .into(),
          ),
          ..challenge(
            "write-long-story",
            "Write a Long Story",
            "Modify the prompt to make Claude generate a response of at least 800 words.",
            "",
            // At least 800 whitespace-separated words.
            regex(r"(?:[^ \t\r\n]+[ \t\r\n]+){799}[^ \t\r\n]"),
          )
        },
      ],
    },
    Level {
      id: "assigning-roles".into(),
      name: "Assigning Roles (Role Prompting)".into(),
      description: "Learn how to use role prompting effectively".into(),
      challenges: vec![Challenge {
        initial_system_prompt: Some(String::new()),
        system_prompt_placeholder: Some("You are a...".into()),
        user_prompt_placeholder: Some("The user prompt is not editable for this challenge.".into()),
        is_immutable_user_prompt: true,
        hint: Some("Consider assigning Claude a role in the system prompt that might make it better at solving math problems.".into()),
        ..challenge(
          "math-correction",
          "Math Correction",
          "Modify the system prompt to make Claude grade the math solution as incorrect.",
          "Is this equation solved correctly below?\n\n2x - 3 = 9\n2x = 6\nx = 3",
          regex(r"(?i)incorrect|not correct"),
        )
      }],
    },
    Level {
      id: "separating-data-instructions".into(),
      name: "Separating Data and Instructions".into(),
      description: "Practice separating data from instructions in prompts".into(),
      challenges: vec![
        Challenge {
          initial_system_prompt: Some("ANIMAL= ".into()),
          user_prompt_placeholder: Some("The user prompt is not editable for this challenge.".into()),
          system_prompt_placeholder: Some("Edit the system prompt to use the {ANIMAL} variable".into()),
          is_immutable_user_prompt: true,
          hint: Some("Use an f-string to include the {ANIMAL} variable in your system prompt template.".into()),
          ..challenge(
            "animal-sound",
            "Animal Sound Generator",
            "Modify the prompt to create a template that will take in a variable called `ANIMAL` and ask Claude to make the sound of a cow.",
            "Please respond with the noise that {ANIMAL} makes.",
            regex(r"(?i)moo"),
          )
        },
        Challenge {
          initial_system_prompt: Some(String::new()),
          user_prompt_placeholder: Some("Edit the prompt to use XML tags".into()),
          system_prompt_placeholder: Some("No system prompt needed for this challenge.".into()),
          hint: Some("Wrap the email content in <email></email> tags to separate it from the instruction.".into()),
          xml_tags: vec!["<email>".into(), "</email>".into()],
          ..challenge(
            "email-polishing",
            "Email Polishing with XML Tags",
            "Modify the prompt by adding XML tags to separate the email content from the instructions.",
            "Yo Claude. Show up at 6am tomorrow because I'm the CEO and I say so. <----- Make this email more polite but don't change anything else about it.",
            // "polite" anywhere, plus an <email>...</email> pair.
            regex(r"(?is)polite.*<email>.*</email>|<email>.*polite.*</email>|<email>.*</email>.*polite"),
          )
        },
        Challenge {
          initial_system_prompt: Some("Below is a list of sentences. Tell me the second item on the list.".into()),
          user_prompt_placeholder: Some("Edit the prompt to use XML tags".into()),
          system_prompt_placeholder: Some("The system prompt is not editable for this challenge.".into()),
          is_immutable_user_prompt: true,
          hint: Some("Use <sentences></sentences> tags to clearly separate the list from the instruction.".into()),
          xml_tags: vec!["<sentences>".into(), "</sentences>".into()],
          ..challenge(
            "sentence-list",
            "Sentence List Analysis",
            "Fix the `PROMPT` by adding XML tags so that Claude produces the right answer. DO NOT change any text, only add XML tags.",
            "- Each sentence is about an animal, like rabbits.\n\
             - I like how cows sound\n\
             - This sentence is about spiders\n\
             - This sentence may appear to be about dogs but it's actually about pigs",
            regex(r"(?i)spiders"),
          )
        },
      ],
    },
  ]
}
