use crate::model::{Entity, Paper, PaperEntity};
use indexmap::IndexMap;
use regex::Regex;

// Curated dictionaries. Matching is case-insensitive on word boundaries,
// so "imagenet" in running text hits "ImageNet".

const DATASETS: &[&str] = &[
    "ImageNet", "CIFAR-10", "CIFAR-100", "MNIST", "Fashion-MNIST", "COCO",
    "Pascal VOC", "SQuAD", "GLUE", "SuperGLUE", "WikiText", "Penn Treebank",
    "LibriSpeech", "Switchboard", "TIMIT", "MultiNLI", "SNLI", "CoNLL-2003",
    "OntoNotes", "Natural Questions", "TriviaQA", "HotpotQA", "MS MARCO",
    "Common Crawl", "BookCorpus", "OpenWebText", "The Pile", "LAION",
    "Kinetics", "AudioSet", "VoxCeleb", "KITTI", "nuScenes", "Cityscapes",
    "ADE20K", "CelebA", "ShapeNet",
];

const METHODS: &[&str] = &[
    "transformer", "BERT", "RoBERTa", "GPT", "T5", "XLNet", "ELMo",
    "word2vec", "GloVe", "ResNet", "VGG", "AlexNet", "U-Net", "YOLO",
    "Faster R-CNN", "Mask R-CNN", "vision transformer", "CLIP", "LSTM",
    "GRU", "self-attention", "convolutional neural network",
    "recurrent neural network", "graph neural network", "autoencoder",
    "variational autoencoder", "generative adversarial network",
    "diffusion model", "dropout", "batch normalization",
    "layer normalization", "stochastic gradient descent", "Adam",
    "reinforcement learning", "Q-learning", "policy gradient",
    "actor-critic", "beam search", "contrastive learning",
    "knowledge distillation", "transfer learning", "random forest",
    "support vector machine", "gradient boosting", "XGBoost",
];

const TASKS: &[&str] = &[
    "image classification", "object detection", "semantic segmentation",
    "instance segmentation", "machine translation", "question answering",
    "named entity recognition", "sentiment analysis", "text classification",
    "speech recognition", "speech synthesis", "language modeling",
    "text summarization", "information retrieval", "link prediction",
    "node classification", "graph classification", "pose estimation",
    "depth estimation", "action recognition", "anomaly detection",
    "reading comprehension", "dependency parsing", "relation extraction",
    "entity linking", "image captioning", "visual question answering",
];

const METRICS: &[&str] = &[
    "accuracy", "precision", "recall", "F1", "BLEU", "ROUGE", "METEOR",
    "perplexity", "word error rate", "mean average precision", "AUC",
    "mean squared error", "RMSE", "MAE", "IoU", "top-1 accuracy",
    "top-5 accuracy", "exact match", "NDCG", "MRR", "PSNR", "SSIM", "FID",
];

struct Pattern {
    name: &'static str,
    entity_type: &'static str,
    role: &'static str,
    regex: Regex,
}

/// Case-insensitive word-boundary matcher over the fixed dictionaries.
pub struct EntityExtractor {
    patterns: Vec<Pattern>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    pub fn new() -> Self {
        let mut patterns = Vec::new();
        let mut add = |names: &[&'static str], entity_type: &'static str, role: &'static str| {
            for &name in names {
                let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
                    .expect("dictionary entries compile");
                patterns.push(Pattern {
                    name,
                    entity_type,
                    role,
                    regex,
                });
            }
        };
        add(DATASETS, "dataset", "uses");
        add(METHODS, "method", "applies");
        add(TASKS, "task", "evaluates");
        add(METRICS, "metric", "evaluates");
        EntityExtractor { patterns }
    }

    /// Matches for one paper, deduplicated by `(type, lowercased name)`.
    pub fn extract(&self, paper: &Paper) -> Vec<(&'static str, &'static str, &'static str)> {
        let haystack = format!(
            "{} {}",
            paper.title,
            paper.abstract_text.as_deref().unwrap_or("")
        );
        let mut seen: IndexMap<(&str, String), ()> = IndexMap::new();
        let mut matches = Vec::new();
        for pattern in &self.patterns {
            if !pattern.regex.is_match(&haystack) {
                continue;
            }
            let key = (pattern.entity_type, pattern.name.to_lowercase());
            if seen.insert(key, ()).is_some() {
                continue;
            }
            matches.push((pattern.name, pattern.entity_type, pattern.role));
        }
        matches
    }

    /// Run the extractor over every paper, merging identical entities into
    /// one row each. Links address entities by index into the returned
    /// batch, ready for a single transactional insert.
    pub fn extract_batch(&self, papers: &[Paper]) -> (Vec<Entity>, Vec<PaperEntity>) {
        let mut entity_index: IndexMap<(&str, String), usize> = IndexMap::new();
        let mut entities = Vec::new();
        let mut links = Vec::new();

        for paper in papers {
            let Some(paper_id) = paper.id else {
                continue;
            };
            for (name, entity_type, role) in self.extract(paper) {
                let key = (entity_type, name.to_lowercase());
                let index = *entity_index.entry(key).or_insert_with(|| {
                    entities.push(Entity {
                        name: name.to_string(),
                        entity_type: entity_type.to_string(),
                        aliases: None,
                    });
                    entities.len() - 1
                });
                links.push(PaperEntity {
                    paper_id,
                    entity_index: index,
                    role: role.to_string(),
                });
            }
        }
        (entities, links)
    }
}
