use bitvec::prelude::*;
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::*;

/// Levels stored inline in a [`NodePath`] before it spills to the heap.
pub const INLINE_LEVELS: usize = 8;

/// Ids of the blocks on the way from the root to a word, ending with the word id.
pub type NodePath = SmallVec<[usize; INLINE_LEVELS]>;

/// Parameters of vocabulary construction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct VocabularyParams {
    /// Number of children per node (k).
    pub branching_factor: usize,
    /// Maximum number of levels (L).
    pub depth_levels: usize,
    pub weighting: Weighting,
    pub scoring: Scoring,
    /// Upper bound on k-majority iterations at each node.
    pub max_iterations: usize,
    /// Seed of the cluster initialization.
    pub seed: u64,
}

impl Default for VocabularyParams {
    fn default() -> Self {
        Self {
            branching_factor: 10,
            depth_levels: 6,
            weighting: Weighting::TfIdf,
            scoring: Scoring::L1Norm,
            max_iterations: 100,
            seed: 42,
        }
    }
}

impl VocabularyParams {
    pub fn validate(&self) -> BowResult<()> {
        if self.branching_factor < 2 {
            return Err(BowErr::InvalidParams(format!(
                "branching factor must be at least 2, got {}",
                self.branching_factor
            )));
        }
        if self.depth_levels == 0 {
            return Err(BowErr::InvalidParams("depth must be at least 1".into()));
        }
        if self.max_iterations == 0 {
            return Err(BowErr::InvalidParams(
                "at least one clustering iteration is required".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Feature vocabulary built from a batch of per-image keypoint descriptors. Can be:
/// 1. Created.
/// 2. Saved to a file & loaded from a file (requires bincode feature, enabled by default).
/// 3. Used to transform a new set of descriptors into a BoW representation (and
///    optionally get DirectIndex from features to nodes).
pub struct Vocabulary {
    blocks: Vec<Block>,
    k: usize,
    l: usize,
    weighting: Weighting,
    scoring: Scoring,
    num_blocks: usize,
    num_leaves: usize,
}

/// Summary of a vocabulary, cheap to compare before and after a save/load cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyStats {
    pub branching_factor: usize,
    pub depth_levels: usize,
    pub weighting: Weighting,
    pub scoring: Scoring,
    pub words: usize,
    pub blocks: usize,
    pub training_features: usize,
}

/// Vocabulary API
impl Vocabulary {
    /// Transform a set of binary descriptors into its bag of words
    /// representation with respect to the Vocabulary, normalized
    /// according to the scoring scheme.
    pub fn transform(&self, features: &[Desc]) -> BoW {
        self.transform_generic(features, false).0
    }

    /// Transform a set of binary descriptors into its bag of words
    /// representation with respect to the Vocabulary.
    ///
    /// Also provides "direct index" from the features to their corresponding nodes in the Vocabulary tree.
    ///
    /// The direct index for `feature[i]` is `di = DirectIdx[i]` where
    /// `di.len() <= l` (number of levels), and `di[j]` is the id of the node matching `feature[i]`
    /// at level `j` in the Vocabulary tree.
    pub fn transform_with_direct_idx(&self, features: &[Desc]) -> (BoW, DirectIdx) {
        self.transform_generic(features, true)
    }

    /// Similarity of two BoW vectors under this vocabulary's scoring scheme.
    pub fn score(&self, a: &BoW, b: &BoW) -> f32 {
        self.scoring.score(a, b)
    }

    /// Build a vocabulary from a batch of per-image descriptor sets.
    ///
    /// Images without descriptors still count as documents for idf weights.
    /// Fails if the batch holds no descriptor at all.
    pub fn create(batch: FeatureBatch, params: &VocabularyParams) -> BowResult<Self> {
        params.validate()?;
        let features: Vec<Desc> = batch.iter().flatten().copied().collect();
        if features.is_empty() {
            return Err(BowErr::EmptyTrainingSet);
        }

        // Start with root of tree
        let mut v = Self::empty(params);
        let mut rng = StdRng::seed_from_u64(params.seed);

        // Build with recursive k-majority clustering of features
        v.cluster(&mut rng, &features, &[0], 1, params.max_iterations);

        // Sort by block id
        v.blocks.sort_by_key(|b| b.id);

        if v.weighting.uses_idf() {
            v.set_idf_weights(&batch);
        }
        Ok(v)
    }

    /// Load an ABoW vocabulary from a file
    #[cfg(feature = "bincode")]
    pub fn load<P: AsRef<std::path::Path>>(file: P) -> BowResult<Self> {
        let mut file = std::fs::File::open(file)?;
        let mut buffer: Vec<u8> = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut buffer)?;
        Ok(bincode::deserialize(&buffer)?)
    }

    /// Save vocabulary to a file
    #[cfg(feature = "bincode")]
    pub fn save<P: AsRef<std::path::Path>>(&self, file: P) -> BowResult<()> {
        let serialized = bincode::serialize(&self)?;
        let mut file = std::fs::File::create(file)?;
        std::io::Write::write_all(&mut file, &serialized)?;
        Ok(())
    }

    pub fn num_words(&self) -> usize {
        self.num_leaves
    }

    pub fn branching_factor(&self) -> usize {
        self.k
    }

    pub fn depth_levels(&self) -> usize {
        self.l
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn scoring(&self) -> Scoring {
        self.scoring
    }

    /// Weight of a word, `None` if the id is out of range.
    pub fn word_weight(&self, word: usize) -> Option<f32> {
        self.leaves()
            .find(|(path, _, _)| path.last() == Some(&word))
            .map(|(_, w, _)| w)
    }

    pub fn stats(&self) -> VocabularyStats {
        VocabularyStats {
            branching_factor: self.branching_factor(),
            depth_levels: self.depth_levels(),
            weighting: self.weighting(),
            scoring: self.scoring(),
            words: self.num_words(),
            blocks: self.num_blocks,
            training_features: self.leaves().map(|(_, _, size)| size).sum(),
        }
    }
}

/////////////////////                Helpers                 ////////////////////////
/////////////////////////////////////////////////////////////////////////////////////

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
/// A unit representing a non-leaf node in the vocabulary
struct Block {
    id: usize,
    children: Children,
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
/// Data structure representing the child nodes of a block, which may
/// or may not be leaves
struct Children {
    features: Vec<Desc>,
    weights: Vec<f32>,
    cluster_size: Vec<usize>,
    ids: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Unique identifier for a node. The Leaf variant stores ids of all its parents,
/// which is equivalent to the DirectIndex for any feature matching that leaf.
enum NodeId {
    Block(usize),
    Leaf(NodePath),
}

impl Vocabulary {
    fn transform_generic(&self, features: &[Desc], di: bool) -> (BoW, DirectIdx) {
        let mut bow: BoW = vec![0.; self.num_leaves];
        let mut direct_idx: DirectIdx = Vec::new();
        for feature in features {
            let Some((path, weight)) = self.lookup(feature) else {
                continue;
            };
            if di {
                // add word parent ids to direct index
                direct_idx.push(path.clone());
            }
            let Some(w) = path.last().and_then(|&id| bow.get_mut(id)) else {
                continue;
            };
            if weight > 0. {
                if self.weighting.accumulates() {
                    *w += weight;
                } else if *w == 0. {
                    *w = weight;
                }
            }
        }
        bow.normalize(self.scoring);
        (bow, direct_idx)
    }

    /// Descend from the root to the word closest to `feature`.
    /// Returns the word's path and weight.
    fn lookup(&self, feature: &Desc) -> Option<(&NodePath, f32)> {
        // start at root block
        let mut block = self.blocks.first()?;

        // traverse tree
        loop {
            let best = Self::nearest(&block.children.features, feature);
            match block.children.ids.get(best)? {
                NodeId::Block(id) => {
                    block = self.blocks.get(*id)?;
                }
                NodeId::Leaf(path) => {
                    return Some((path, block.children.weights[best]));
                }
            }
        }
    }

    fn cluster(
        &mut self,
        rng: &mut StdRng,
        features: &[Desc],
        parent_ids: &[usize],
        curr_level: usize,
        max_iterations: usize,
    ) {
        debug!(
            "KMeans step with {} features. parents: {:?}, level {}",
            features.len(),
            parent_ids,
            curr_level
        );
        if features.is_empty() {
            return;
        }

        let (clusters, groups): (Vec<Desc>, Vec<Vec<usize>>) = if features.len() <= self.k {
            // Only one feature per cluster
            (
                features.to_vec(),
                (0..features.len()).map(|i| vec![i]).collect(),
            )
        } else {
            self.k_majority(rng, features, max_iterations)
        };

        // Create block
        let bottom = curr_level == self.l;
        let ids: Vec<_> = groups
            .iter()
            .map(|g| self.next_node_id(bottom || g.len() == 1, parent_ids))
            .collect();

        let children = Children {
            weights: vec![1.; groups.len()],
            ids: ids.clone(),
            cluster_size: groups.iter().map(Vec::len).collect(),
            features: clusters,
        };
        let block = Block {
            id: parent_ids.last().copied().unwrap_or(0),
            children,
        };
        self.blocks.push(block);

        // Recurse
        if curr_level < self.l {
            for (id, group) in ids.iter().zip(&groups) {
                if let NodeId::Block(bid) = id {
                    // get features from child cluster
                    let features: Vec<Desc> = group.iter().map(|&j| features[j]).collect();

                    // update parent ids
                    let mut ids = parent_ids.to_vec();
                    ids.push(*bid);

                    // cluster on child cluster
                    self.cluster(rng, &features, &ids, curr_level + 1, max_iterations);
                }
            }
        }
    }

    /// Split `features` into at most k groups. Returns the group centers and
    /// the member indices of each group; empty groups are dropped.
    fn k_majority(
        &self,
        rng: &mut StdRng,
        features: &[Desc],
        max_iterations: usize,
    ) -> (Vec<Desc>, Vec<Vec<usize>>) {
        let mut clusters = Self::initialize_clusters(rng, features, self.k);
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for _ in 0..max_iterations {
            let mut new_groups: Vec<Vec<usize>> = vec![Vec::new(); clusters.len()];
            for (i, f) in features.iter().enumerate() {
                new_groups[Self::nearest(&clusters, f)].push(i);
            }

            if groups == new_groups {
                break; // converged
            }

            // update clusters
            clusters = new_groups
                .iter()
                .map(|group| Self::desc_mean(group.iter().map(|&i| &features[i]).collect()))
                .collect();
            groups = new_groups;
        }

        clusters
            .into_iter()
            .zip(groups)
            .filter(|(_, g)| !g.is_empty())
            .unzip()
    }

    /// Initialize clusters for k-majority with kmeans++ seeding.
    /// Stops early when every remaining feature coincides with a center.
    fn initialize_clusters(rng: &mut StdRng, features: &[Desc], k: usize) -> Vec<Desc> {
        let first = features[rng.gen_range(0..features.len())];
        let sq = |a: &Desc, b: &Desc| {
            let d = Self::hamming(a, b) as f64;
            d * d
        };
        let mut min_dist: Vec<f64> = features.iter().map(|f| sq(f, &first)).collect();
        let mut clusters = vec![first];

        while clusters.len() < k {
            let total: f64 = min_dist.iter().sum();
            if total <= 0. {
                break;
            }
            let mut target = rng.gen::<f64>() * total;
            let mut pick = min_dist.iter().rposition(|&d| d > 0.).unwrap_or(0);
            for (i, &d) in min_dist.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }

            let center = features[pick];
            for (d, f) in min_dist.iter_mut().zip(features) {
                *d = d.min(sq(f, &center));
            }
            clusters.push(center);
        }
        clusters
    }

    /// Index of the center closest to `f`. Ties go to the lowest index.
    fn nearest(centers: &[Desc], f: &Desc) -> usize {
        let mut best: (usize, u32) = (0, u32::MAX);
        for (j, c) in centers.iter().enumerate() {
            let d = Self::hamming(c, f);
            if d < best.1 {
                best = (j, d);
            }
        }
        best.0
    }

    #[inline]
    /// Compute the mean of a collection of binary arrays (descriptors).
    fn desc_mean(descriptors: Vec<&Desc>) -> Desc {
        let n2 = descriptors.len() / 2;
        let mut counts = vec![0; DESC_WIDTH * 8];
        let mut result: Desc = [0; DESC_WIDTH];
        for d in descriptors {
            for i in d.view_bits::<Msb0>().iter_ones() {
                counts[i] += 1;
            }
        }
        let result_bits = result.view_bits_mut::<Msb0>();
        for (i, &c) in counts.iter().enumerate() {
            if c > n2 {
                result_bits.set(i, true);
            }
        }
        result
    }

    #[inline]
    /// Hamming distance between two binary arrays (descriptors).
    fn hamming(x: &[u8], y: &[u8]) -> u32 {
        x.iter()
            .zip(y)
            .fold(0, |a, (b, c)| a + (*b ^ *c).count_ones())
    }

    /// Provide the next NodeId, either leaf/word or block.
    fn next_node_id(&mut self, leaf: bool, parent_ids: &[usize]) -> NodeId {
        match leaf {
            true => {
                // Leaf node will hold the block ids of its parents in addition to leaf id, to facilitate getting direct index later
                let mut path: NodePath = parent_ids.iter().skip(1).copied().collect(); // Drop the first parent which is always 0
                path.push(self.num_leaves); // Add leaf id
                self.num_leaves += 1;
                NodeId::Leaf(path)
            }
            false => {
                let id = self.num_blocks;
                self.num_blocks += 1;
                NodeId::Block(id)
            }
        }
    }

    /// Set every word weight to `ln(N / n_i)`, with `N` the number of
    /// training images and `n_i` the number of them containing word `i`.
    fn set_idf_weights(&mut self, batch: &FeatureBatch) {
        let n_images = batch.len() as f32;
        let mut counts = vec![0usize; self.num_leaves];
        // last image that counted each word
        let mut seen = vec![usize::MAX; self.num_leaves];
        for (img, descs) in batch.iter().enumerate() {
            for d in descs {
                let Some(word) = self.lookup(d).and_then(|(p, _)| p.last().copied()) else {
                    continue;
                };
                if seen[word] != img {
                    seen[word] = img;
                    counts[word] += 1;
                }
            }
        }

        for block in self.blocks.iter_mut() {
            let children = &mut block.children;
            for (id, weight) in children.ids.iter().zip(children.weights.iter_mut()) {
                if let NodeId::Leaf(path) = id {
                    let n = path.last().map_or(0, |&w| counts[w]);
                    *weight = if n > 0 {
                        (n_images / n as f32).ln()
                    } else {
                        0.
                    };
                }
            }
        }
    }

    /// Iterate over words as (path, weight, training cluster size).
    fn leaves(&self) -> impl Iterator<Item = (&NodePath, f32, usize)> {
        self.blocks.iter().flat_map(|b| {
            let c = &b.children;
            c.ids.iter().enumerate().filter_map(move |(i, id)| match id {
                NodeId::Leaf(path) => Some((path, c.weights[i], c.cluster_size[i])),
                NodeId::Block(_) => None,
            })
        })
    }

    fn empty(params: &VocabularyParams) -> Self {
        Self {
            blocks: Vec::new(),
            k: params.branching_factor,
            l: params.depth_levels,
            weighting: params.weighting,
            scoring: params.scoring,
            // the root block is always 0
            num_blocks: 1,
            num_leaves: 0,
        }
    }
}

impl fmt::Debug for Children {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Children")
            .field("ids", &self.ids)
            .field("weights", &self.weights)
            .field("cluster size", &self.cluster_size)
            .finish()
    }
}

impl fmt::Debug for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clust_sizes: Vec<usize> = self.leaves().map(|(_, _, size)| size).collect();
        let sum = clust_sizes.iter().sum::<usize>();
        f.debug_struct("Vocabulary")
            .field("Word/Leaf Nodes", &self.num_leaves)
            .field("Other Nodes", &self.num_blocks)
            .field("Levels", &self.l)
            .field("Branching Factor", &self.k)
            .field("Weighting", &self.weighting)
            .field("Scoring", &self.scoring)
            .field("Total Training Features", &sum)
            .field(
                "Min Word Cluster Size",
                &clust_sizes.iter().min().copied().unwrap_or(0),
            )
            .field(
                "Max Word Cluster Size",
                &clust_sizes.iter().max().copied().unwrap_or(0),
            )
            .field(
                "Mean Word Cluster Size",
                &(sum / clust_sizes.len().max(1)),
            )
            .finish()
    }
}

impl fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Vocabulary: k = {}, L = {}, Weighting = {}, Scoring = {}, Number of words = {}",
            self.k, self.l, self.weighting, self.scoring, self.num_leaves
        )
    }
}
