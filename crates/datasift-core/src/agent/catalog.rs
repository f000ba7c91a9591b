//! Fixed per-dataset SQL shown to the agent

use crate::dataset::DatasetKind;

/// Worked query shown by `get_advanced_examples`
pub struct AdvancedExample {
    pub title: &'static str,
    pub sql: &'static str,
}

/// Queries run by `run_sample_queries`
pub fn sample_queries(kind: DatasetKind) -> &'static [&'static str] {
    match kind {
        DatasetKind::News => &[
            "SELECT * FROM news LIMIT 3",
            "SELECT COUNT(*) AS article_count FROM news",
            "SELECT category, COUNT(*) AS article_count FROM news GROUP BY category ORDER BY article_count DESC",
            "SELECT id, title, LENGTH(text) AS text_length FROM news ORDER BY text_length DESC LIMIT 5",
        ],
        DatasetKind::Movies => &[
            "SELECT id, title, release_date, director, vote_average FROM movies LIMIT 3",
            "SELECT MIN(release_date) AS first_release, MAX(release_date) AS last_release FROM movies",
            "SELECT ROUND(AVG(vote_average), 2) AS avg_rating FROM movies",
            "SELECT director, COUNT(*) AS movie_count FROM movies WHERE director IS NOT NULL GROUP BY director ORDER BY movie_count DESC LIMIT 5",
            "SELECT substr(release_date, 1, 4) AS year, COUNT(*) AS releases FROM movies GROUP BY year ORDER BY releases DESC LIMIT 5",
        ],
        DatasetKind::Reviews => &[
            "SELECT * FROM Reviews LIMIT 3",
            "SELECT DISTINCT Score FROM Reviews ORDER BY Score",
            "SELECT MIN(Time) AS min_time, MAX(Time) AS max_time FROM Reviews",
            "SELECT COUNT(DISTINCT ProductId) AS product_count FROM Reviews",
            "SELECT COUNT(DISTINCT UserId) AS user_count FROM Reviews",
            "SELECT ProductId, COUNT(*) AS review_count FROM Reviews GROUP BY ProductId ORDER BY review_count DESC LIMIT 5",
            "SELECT Score, COUNT(*) AS score_count FROM Reviews GROUP BY Score ORDER BY Score",
            "SELECT AVG(HelpfulnessNumerator * 1.0 / HelpfulnessDenominator) AS avg_helpfulness FROM Reviews WHERE HelpfulnessDenominator > 0",
        ],
    }
}

/// Examples returned by `get_advanced_examples`
pub fn advanced_examples(kind: DatasetKind) -> &'static [AdvancedExample] {
    match kind {
        DatasetKind::News => &NEWS_EXAMPLES,
        DatasetKind::Movies => &MOVIE_EXAMPLES,
        DatasetKind::Reviews => &REVIEW_EXAMPLES,
    }
}

static NEWS_EXAMPLES: [AdvancedExample; 3] = [
    AdvancedExample {
        title: "Share of articles per category",
        sql: "WITH totals AS (
    SELECT COUNT(*) AS total FROM news
)
SELECT category,
       COUNT(*) AS article_count,
       ROUND(COUNT(*) * 100.0 / (SELECT total FROM totals), 1) AS percent
FROM news
GROUP BY category
ORDER BY article_count DESC",
    },
    AdvancedExample {
        title: "Categories with long articles on average",
        sql: "SELECT category, AVG(LENGTH(text)) AS avg_length
FROM news
GROUP BY category
HAVING avg_length > 2000
ORDER BY avg_length DESC",
    },
    AdvancedExample {
        title: "Bucket articles by length",
        sql: "SELECT
    CASE
        WHEN LENGTH(text) < 1000 THEN 'short'
        WHEN LENGTH(text) < 3000 THEN 'medium'
        ELSE 'long'
    END AS length_bucket,
    COUNT(*) AS article_count
FROM news
GROUP BY length_bucket
LIMIT 10",
    },
];

static MOVIE_EXAMPLES: [AdvancedExample; 3] = [
    AdvancedExample {
        title: "Directors with consistently high ratings",
        sql: "SELECT director,
       COUNT(*) AS movie_count,
       ROUND(AVG(vote_average), 2) AS avg_rating
FROM movies
WHERE director IS NOT NULL
GROUP BY director
HAVING movie_count >= 3 AND avg_rating >= 7
ORDER BY avg_rating DESC
LIMIT 10",
    },
    AdvancedExample {
        title: "Best rated movie per year",
        sql: "WITH ranked AS (
    SELECT title,
           substr(release_date, 1, 4) AS year,
           vote_average,
           ROW_NUMBER() OVER (PARTITION BY substr(release_date, 1, 4) ORDER BY vote_average DESC) AS rank
    FROM movies
    WHERE release_date IS NOT NULL
)
SELECT year, title, vote_average
FROM ranked
WHERE rank = 1
ORDER BY year DESC
LIMIT 10",
    },
    AdvancedExample {
        title: "Revenue bands by decade",
        sql: "SELECT substr(release_date, 1, 3) || '0s' AS decade,
       SUM(CASE WHEN revenue >= 100000000 THEN 1 ELSE 0 END) AS blockbusters,
       COUNT(*) AS total
FROM movies
GROUP BY decade
ORDER BY decade DESC
LIMIT 10",
    },
];

static REVIEW_EXAMPLES: [AdvancedExample; 3] = [
    AdvancedExample {
        title: "Polarizing products (many 5-star and 1-star reviews)",
        sql: "WITH product_rating_counts AS (
    SELECT ProductId,
           SUM(CASE WHEN Score = 1 THEN 1 ELSE 0 END) AS one_star_count,
           SUM(CASE WHEN Score = 5 THEN 1 ELSE 0 END) AS five_star_count,
           COUNT(*) AS total_reviews
    FROM Reviews
    GROUP BY ProductId
    HAVING total_reviews >= 10
)
SELECT ProductId, one_star_count, five_star_count, total_reviews,
       (one_star_count * 1.0 / total_reviews) AS one_star_ratio,
       (five_star_count * 1.0 / total_reviews) AS five_star_ratio
FROM product_rating_counts
WHERE one_star_count >= 3 AND five_star_count >= 3
ORDER BY (one_star_count + five_star_count) DESC
LIMIT 10",
    },
    AdvancedExample {
        title: "Most reviewed products",
        sql: "SELECT ProductId,
       COUNT(*) AS review_count,
       AVG(Score) AS avg_score,
       MIN(Time) AS first_review_time,
       MAX(Time) AS last_review_time
FROM Reviews
GROUP BY ProductId
ORDER BY review_count DESC
LIMIT 10",
    },
    AdvancedExample {
        title: "Score trend of one product over time",
        sql: "WITH time_periods AS (
    SELECT ProductId,
           CASE
               WHEN Time < 1356998400 THEN 'before_2013'
               WHEN Time < 1388534400 THEN '2013'
               WHEN Time < 1420070400 THEN '2014'
               ELSE 'after_2014'
           END AS time_period,
           Score
    FROM Reviews
    WHERE ProductId = 'B001E4KFG0'
)
SELECT time_period, COUNT(*) AS review_count, AVG(Score) AS avg_score
FROM time_periods
GROUP BY time_period
ORDER BY time_period
LIMIT 10",
    },
];
