//! Maps learned field boxes into the frame of a matched page.

use serde::Serialize;

use crate::{
    algorithms::similarity::SimilarityTransform, geometry::BoundingBox, matching::MatchResult,
    template::FieldBox,
};

/// A field box ready for text extraction on the matched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectedField {
    pub field_name: String,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FieldProjector;

impl FieldProjector {
    /// Each box's corners are mapped through `transform` and replaced by
    /// their axis-aligned bounds. Without a transform the boxes are used as
    /// learned.
    pub fn project(
        &self,
        fields: &[FieldBox],
        transform: Option<&SimilarityTransform>,
    ) -> Vec<ProjectedField> {
        fields
            .iter()
            .map(|field| ProjectedField {
                field_name: field.field_name.clone(),
                bounding_box: transform
                    .and_then(|t| project_box(&field.bounding_box, t))
                    .unwrap_or(field.bounding_box),
            })
            .collect()
    }

    pub fn project_match(&self, result: &MatchResult) -> Vec<ProjectedField> {
        self.project(
            result.template.fields(),
            result.lock.as_ref().map(|lock| &lock.transform),
        )
    }
}

fn project_box(bbox: &BoundingBox, transform: &SimilarityTransform) -> Option<BoundingBox> {
    let corners = bbox.corners().map(|c| transform.apply(&c));
    BoundingBox::enclosing(&corners)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;

    fn fields() -> Vec<FieldBox> {
        vec![
            FieldBox::new("invoice_number", BoundingBox::new(120, 40, 80, 20)),
            FieldBox::new("total_amount", BoundingBox::new(-3, 7, 1, 1)),
        ]
    }

    #[test]
    fn identity_and_missing_transform_leave_boxes_unchanged() {
        let projector = FieldProjector;
        let identity = SimilarityTransform::identity();
        for transform in [None, Some(&identity)] {
            let projected = projector.project(&fields(), transform);
            let boxes: Vec<_> = projected.iter().map(|p| p.bounding_box).collect();
            assert_eq!(boxes, [BoundingBox::new(120, 40, 80, 20), BoundingBox::new(-3, 7, 1, 1)]);
            assert_eq!(projected[0].field_name, "invoice_number");
        }
    }

    #[test]
    fn translation_shifts_and_rotation_swaps_extent() {
        let projector = FieldProjector;
        let shifted = projector.project(
            &fields()[..1],
            Some(&SimilarityTransform::from_params(1.0, 0.0, -20.0, 15.0)),
        );
        assert_eq!(shifted[0].bounding_box, BoundingBox::new(100, 55, 80, 20));

        let quarter_turn = SimilarityTransform::from_scale_rotation_translation(2.0, FRAC_PI_2, 0.0, 0.0);
        let rotated = projector.project(&fields()[..1], Some(&quarter_turn));
        // (x, y) -> (-2y, 2x)
        assert_eq!(rotated[0].bounding_box, BoundingBox::new(-120, 240, 40, 160));
    }
}
